//! Two-axis queries end to end: cell values, ordinals, caching and stats.
use std::sync::Arc;

use super::common::{SalesCube, ints, sales_cube, set_of, values};
use crate::calc::{ChildrenCalc, CrossJoinCalc, MembersCalc};
use crate::engine::{Query, Step};
use crate::member::HierarchyId;
use rolap_common::CellValue;

fn grid_query(c: &SalesCube) -> Arc<Query> {
    let products: Vec<_> = c.products.iter().collect();
    Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&products))
            .with_axis("ROWS", set_of(&[&c.sf, &c.la, &c.wa])),
    )
}

#[test]
fn three_by_four_grid() {
    let c = sales_cube();
    let query = grid_query(&c);
    let (engine, facts) = c.into_engine();

    let mut result = engine.execute(&query).unwrap();
    assert_eq!(result.axes().len(), 2);
    assert_eq!(result.axes()[0].len(), 4);
    assert_eq!(result.axes()[1].len(), 3);
    assert_eq!(result.total_cell_count().unwrap(), 12);
    assert_eq!(result.cell_count(), 12);

    // Axis 0 varies fastest.
    assert_eq!(
        values(&mut result),
        ints(&[10, 11, 12, 13, 20, 21, 22, 23, 30, 31, 32, 33])
    );
    let cell = result.cell(&[2, 1]).unwrap();
    assert_eq!(cell.ordinal(), 6);
    assert_eq!(cell.value(), &CellValue::Int(22));
    assert_eq!(result.cell_pos(6).unwrap().as_slice(), &[2, 1]);

    // One batch for all twelve cells.
    assert_eq!(facts.batch_count(), 1);
    assert_eq!(facts.request_count(), 12);
    let stats = result.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.redos(Step::ComputeCells), 1);
    assert_eq!(stats.cells_computed, 12);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.hits, 12);
}

#[test]
fn second_run_is_served_from_the_cache() {
    let c = sales_cube();
    let query = grid_query(&c);
    let (engine, facts) = c.into_engine();

    let mut first = engine.execute(&query).unwrap();
    let mut second = engine.execute(&query).unwrap();
    assert_eq!(values(&mut first), values(&mut second));
    assert_eq!(second.stats().loads, 0);
    assert_eq!(second.stats().misses, 0);
    assert_eq!(second.stats().total_redos(), 0);
    assert_eq!(facts.batch_count(), 1);
    assert_eq!(engine.cache().len(), 12);
}

#[test]
fn rerunning_a_query_reproduces_members_and_cells() {
    let c = sales_cube();
    let rows = Arc::new(CrossJoinCalc::new(
        Arc::new(MembersCalc::new(c.store)),
        set_of(&[&c.sales, &c.customers]),
    ));
    let query = Arc::new(
        Query::new()
            .with_axis("ROWS", rows)
            .with_slicer(set_of(&[&c.products[0], &c.products[1]])),
    );
    let (engine, facts) = c.into_engine();

    let snapshot = |result: &mut crate::engine::QueryResult| {
        let axes: Vec<_> = result.axes().iter().map(|a| a.unique_names()).collect();
        let slicer = result.slicer_axis().unique_names();
        let cells: Vec<_> = result
            .cells()
            .unwrap()
            .into_iter()
            .map(|c| (c.ordinal(), c.value().clone()))
            .collect();
        (axes, slicer, cells)
    };

    let mut first = engine.execute(&query).unwrap();
    let batches = facts.batch_count();
    assert!(batches > 0);
    let mut second = engine.execute(&query).unwrap();

    assert_eq!(snapshot(&mut first), snapshot(&mut second));
    assert_eq!(first.axes()[0].len(), 10);
    assert_eq!(second.stats().loads, 0);
    assert_eq!(second.stats().misses, 0);
    assert_eq!(facts.batch_count(), batches);
}

#[test]
fn out_of_range_coordinates_are_rejected() {
    let c = sales_cube();
    let query = grid_query(&c);
    let (engine, _) = c.into_engine();
    let mut result = engine.execute(&query).unwrap();

    assert_eq!(
        result.cell(&[4, 0]).unwrap_err().kind,
        rolap_common::OlapErrorKind::Range
    );
    assert!(result.cell(&[0]).is_err());
    assert!(result.cell_pos(12).is_err());
}

#[test]
fn rollups_through_the_hierarchy() {
    let c = sales_cube();
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales, &c.units]))
            .with_axis("ROWS", Arc::new(MembersCalc::new(c.store))),
    );
    let (engine, _) = c.into_engine();
    let mut result = engine.execute(&query).unwrap();

    let rows: Vec<_> = result.axes()[1]
        .unique_names()
        .into_iter()
        .map(|t| t[0].clone())
        .collect();
    assert_eq!(
        rows,
        vec![
            "[Store].[USA]",
            "[Store].[USA].[CA]",
            "[Store].[USA].[CA].[SF]",
            "[Store].[USA].[CA].[LA]",
            "[Store].[USA].[WA]",
        ]
    );
    // (Sales, Units) per row.
    assert_eq!(
        values(&mut result),
        ints(&[258, 12, 132, 8, 46, 4, 86, 4, 126, 4])
    );
}

#[test]
fn crossjoined_rows_and_zero_axis_query() {
    let c = sales_cube();
    let ca_children = Arc::new(ChildrenCalc::new(c.ca.clone()));
    let first_two = set_of(&[&c.products[0], &c.products[1]]);
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales]))
            .with_axis("ROWS", Arc::new(CrossJoinCalc::new(ca_children, first_two))),
    );
    let total = Arc::new(Query::new());
    let (engine, _) = c.into_engine();

    let mut result = engine.execute(&query).unwrap();
    assert_eq!(result.axes()[1].len(), 4);
    assert_eq!(values(&mut result), ints(&[10, 11, 20, 21]));

    let mut result = engine.execute(&total).unwrap();
    assert_eq!(result.total_cell_count().unwrap(), 1);
    assert_eq!(result.cell(&[]).unwrap().value(), &CellValue::Int(258));
    assert_eq!(result.slicer_axis().len(), 1);
}

#[test]
fn empty_axis_yields_no_cells() {
    let c = sales_cube();
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales]))
            .with_axis("ROWS", set_of(&[])),
    );
    let (engine, facts) = c.into_engine();
    let mut result = engine.execute(&query).unwrap();
    assert_eq!(result.total_cell_count().unwrap(), 0);
    assert!(result.cells().unwrap().is_empty());
    assert_eq!(facts.batch_count(), 0);
    assert_eq!(result.axes()[0].positions()[0][0].hierarchy(), HierarchyId::MEASURES);
}
