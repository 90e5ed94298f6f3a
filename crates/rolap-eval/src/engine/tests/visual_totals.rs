use std::sync::Arc;

use super::common::{SalesCube, ints, sales_cube, set_of, values};
use crate::calc::{CrossJoinCalc, VisualTotalsCalc};
use crate::engine::Query;
use crate::member::MemberRef;
use rolap_common::OlapErrorKind;

fn store_tree(c: &SalesCube) -> Vec<&MemberRef> {
    vec![&c.usa, &c.ca, &c.sf, &c.la, &c.wa]
}

#[test]
fn visual_totals_sum_what_is_on_the_axis() {
    let c = sales_cube();
    let rows = Arc::new(VisualTotalsCalc::new(set_of(&[&c.usa, &c.ca, &c.sf, &c.wa])));
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales]))
            .with_axis("ROWS", rows),
    );
    let (engine, _) = c.into_engine();
    let mut result = engine.execute(&query).unwrap();
    let names: Vec<_> = result.axes()[1]
        .unique_names()
        .into_iter()
        .map(|t| t[0].clone())
        .collect();
    assert_eq!(
        names,
        vec![
            "*[Store].[USA]",
            "*[Store].[USA].[CA]",
            "[Store].[USA].[CA].[SF]",
            "[Store].[USA].[WA]",
        ]
    );
    // LA is not on the axis so it is left out of both totals.
    assert_eq!(values(&mut result), ints(&[172, 46, 46, 126]));
}

#[test]
fn distinct_count_under_nested_visual_totals() {
    let c = sales_cube();
    let rows = Arc::new(VisualTotalsCalc::new(set_of(&store_tree(&c))));
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.customers, &c.sales]))
            .with_axis("ROWS", rows),
    );
    let (engine, _) = c.into_engine();
    let mut result = engine.execute(&query).unwrap();

    // (Customers, Sales) for *USA, *CA, SF, LA, WA. Summing the children
    // of *USA would count c1 and c2 twice.
    assert_eq!(
        values(&mut result),
        ints(&[2, 258, 2, 132, 1, 46, 2, 86, 1, 126])
    );
}

#[test]
fn distinct_count_over_a_compound_slicer() {
    let c = sales_cube();
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.customers]))
            .with_slicer(set_of(&[&c.sf, &c.wa])),
    );
    let (engine, facts) = c.into_engine();
    let mut result = engine.execute(&query).unwrap();
    assert_eq!(values(&mut result), ints(&[2]));
    // One compound request rather than one per slicer member.
    assert_eq!(facts.request_count(), 1);
}

#[test]
fn visual_totals_reject_multi_member_tuples() {
    let c = sales_cube();
    let pairs = Arc::new(CrossJoinCalc::new(
        set_of(&[&c.ca, &c.sf]),
        set_of(&[&c.products[0]]),
    ));
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales]))
            .with_axis("ROWS", Arc::new(VisualTotalsCalc::new(pairs))),
    );
    let (engine, facts) = c.into_engine();
    let err = engine.execute(&query).unwrap_err();
    assert_eq!(err.kind, OlapErrorKind::Type);
    assert!(err.to_string().contains("single-member tuples"), "{err}");
    assert_eq!(facts.batch_count(), 0);
}
