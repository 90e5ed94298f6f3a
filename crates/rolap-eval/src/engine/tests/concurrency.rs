use std::sync::Arc;

use super::common::{ints, sales_cube, set_of, values};
use crate::engine::Query;

#[test]
fn executions_share_one_engine() {
    let c = sales_cube();
    let products: Vec<_> = c.products.iter().collect();
    let grid = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&products))
            .with_axis("ROWS", set_of(&[&c.sf, &c.la, &c.wa])),
    );
    let totals = Arc::new(Query::new().with_axis("COLUMNS", set_of(&[&c.sales, &c.units])));
    let (engine, _) = c.into_engine();

    let (a, b, t) = std::thread::scope(|s| {
        let a = s.spawn(|| values(&mut engine.execute(&grid).unwrap()));
        let b = s.spawn(|| values(&mut engine.execute(&grid).unwrap()));
        let t = s.spawn(|| values(&mut engine.execute(&totals).unwrap()));
        (a.join().unwrap(), b.join().unwrap(), t.join().unwrap())
    });

    let expected = ints(&[10, 11, 12, 13, 20, 21, 22, 23, 30, 31, 32, 33]);
    assert_eq!(a, expected);
    assert_eq!(b, expected);
    assert_eq!(t, ints(&[258, 12]));
    // Both grid executions filled the same shared cache.
    assert!(engine.cache().len() >= 14);
}

#[test]
fn engine_and_results_are_send() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<crate::engine::Engine>();
    assert_sync::<crate::engine::Engine>();
    assert_send::<crate::engine::QueryResult>();
}
