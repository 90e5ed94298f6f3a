//! Members hidden by the schema's access predicate.
use std::sync::Arc;

use super::common::{SalesCube, ints, sales_cube, set_of, values};
use crate::calc::{ChildrenCalc, ConstantCalc, MembersCalc, NamedMemberCalc};
use crate::engine::Query;
use crate::member::MemberRef;
use crate::schema::DenyPrefixes;
use rolap_common::{CellValue, OlapErrorKind};

/// WA and the `Secret` measure are hidden; `Peek` refers to `Secret` by name.
fn restricted_cube() -> (SalesCube, MemberRef) {
    let mut c = sales_cube();
    c.cube.add_calculated_measure(
        "Secret",
        Arc::new(ConstantCalc::new(CellValue::Int(7))),
        0,
        None,
    );
    let peek = c.cube.add_calculated_measure(
        "Peek",
        Arc::new(NamedMemberCalc::new("[Measures].[Secret]")),
        0,
        None,
    );
    c.cube.set_access(Arc::new(DenyPrefixes(vec![
        "[Store].[USA].[WA]".into(),
        "[Measures].[Secret]".into(),
    ])));
    (c, peek)
}

#[test]
fn hidden_members_are_not_found_by_name() {
    let (c, _) = restricted_cube();
    let (engine, _) = c.into_engine();
    let schema = engine.schema();

    assert!(schema.lookup_member("[Store].[USA].[WA]").is_none());
    assert!(schema.lookup_member("[Store].[USA].[CA]").is_some());
    assert!(schema.calculated_member("[Measures].[Secret]").is_none());
    assert!(schema.calculated_member("[Measures].[Peek]").is_some());
    // Stored members are not calculated ones.
    assert!(schema.calculated_member("[Measures].[Sales]").is_none());
}

#[test]
fn hidden_members_are_left_off_the_axes() {
    let (c, _) = restricted_cube();
    let store = c.store;
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales]))
            .with_axis("ROWS", Arc::new(ChildrenCalc::new(c.usa.clone()))),
    );
    let everything = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.units]))
            .with_axis("ROWS", Arc::new(MembersCalc::new(store))),
    );
    let (engine, _) = c.into_engine();

    let mut result = engine.execute(&query).unwrap();
    assert_eq!(result.axes()[1].unique_names(), vec![vec!["[Store].[USA].[CA]"]]);
    assert_eq!(values(&mut result), ints(&[132]));

    let result = engine.execute(&everything).unwrap();
    let rows: Vec<String> = result.axes()[1]
        .unique_names()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(
        rows,
        vec![
            "[Store].[USA]",
            "[Store].[USA].[CA]",
            "[Store].[USA].[CA].[SF]",
            "[Store].[USA].[CA].[LA]",
        ]
    );
}

#[test]
fn hidden_members_are_left_out_of_the_slicer() {
    let (c, _) = restricted_cube();
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales]))
            .with_slicer(Arc::new(ChildrenCalc::new(c.usa.clone()))),
    );
    let (engine, _) = c.into_engine();

    let mut result = engine.execute(&query).unwrap();
    assert_eq!(result.slicer_axis().unique_names(), vec![vec!["[Store].[USA].[CA]"]]);
    assert_eq!(values(&mut result), ints(&[132]));
}

#[test]
fn reference_to_a_hidden_calculated_member_is_a_name_error() {
    let (c, peek) = restricted_cube();
    let query = Arc::new(
        Query::new()
            .with_axis("COLUMNS", set_of(&[&c.sales, &peek]))
            .with_axis("ROWS", set_of(&[&c.sf])),
    );
    let (engine, _) = c.into_engine();

    let mut result = engine.execute(&query).unwrap();
    let cells = values(&mut result);
    assert_eq!(cells[0], CellValue::Int(46));
    assert!(
        matches!(&cells[1], CellValue::Error(e) if e.kind == OlapErrorKind::Name),
        "{:?}",
        cells[1]
    );
}
