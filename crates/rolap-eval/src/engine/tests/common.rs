//! Common test helpers
use std::sync::Arc;

use rolap_common::{Aggregator, CellValue};

use crate::calc::{SetCalc, TupleListCalc};
use crate::engine::{Engine, QueryResult};
use crate::member::{HierarchyId, MemberRef};
use crate::reader::InMemoryFactTable;
use crate::test_cube::TestCube;

/// Store (USA > CA > {SF, LA}, USA > WA) by Product (four roots) by Time
/// (1997, 1998; no `All`).
///
/// 1997 sales for store `s` (SF, LA, WA) and product `p` are
/// `(s + 1) * 10 + p`, one unit per row. SF customers are `c1`, LA
/// alternates `c1`/`c2`, WA is `c2`. 1998 has a single SF/Drink row.
pub struct SalesCube {
    pub cube: TestCube,
    pub sales: MemberRef,
    pub units: MemberRef,
    pub customers: MemberRef,
    pub store: HierarchyId,
    pub product: HierarchyId,
    pub time: HierarchyId,
    pub usa: MemberRef,
    pub ca: MemberRef,
    pub sf: MemberRef,
    pub la: MemberRef,
    pub wa: MemberRef,
    pub products: Vec<MemberRef>,
    pub y1997: MemberRef,
    pub y1998: MemberRef,
}

pub fn sales_cube() -> SalesCube {
    let mut cube = TestCube::new();
    let sales = cube.add_formatted_measure("Sales", Aggregator::Sum, Some("#,##0"));
    let units = cube.add_measure("Units", Aggregator::Sum);
    let customers = cube.add_measure("Customers", Aggregator::DistinctCount);

    let store = cube.add_hierarchy("Store", true);
    let usa = cube.add_root(store, "USA");
    let ca = cube.add_child(&usa, "CA");
    let sf = cube.add_child(&ca, "SF");
    let la = cube.add_child(&ca, "LA");
    let wa = cube.add_child(&usa, "WA");

    let product = cube.add_hierarchy("Product", true);
    let products: Vec<MemberRef> = ["Drink", "Food", "Household", "Toys"]
        .iter()
        .map(|p| cube.add_root(product, p))
        .collect();

    let time = cube.add_hierarchy("Time", false);
    let y1997 = cube.add_root(time, "1997");
    let y1998 = cube.add_root(time, "1998");

    for (s, leaf) in [&sf, &la, &wa].into_iter().enumerate() {
        for (p, prod) in products.iter().enumerate() {
            let customer = match (s, p % 2) {
                (0, _) | (1, 0) => "c1",
                _ => "c2",
            };
            cube.add_fact(
                &[leaf.clone(), prod.clone(), y1997.clone()],
                &[
                    ("sales", CellValue::Int(((s + 1) * 10 + p) as i64)),
                    ("units", CellValue::Int(1)),
                    ("customers", customer.into()),
                ],
            );
        }
    }
    cube.add_fact(
        &[sf.clone(), products[0].clone(), y1998.clone()],
        &[
            ("sales", CellValue::Int(100)),
            ("units", CellValue::Int(5)),
            ("customers", "c3".into()),
        ],
    );

    SalesCube {
        cube,
        sales,
        units,
        customers,
        store,
        product,
        time,
        usa,
        ca,
        sf,
        la,
        wa,
        products,
        y1997,
        y1998,
    }
}

impl SalesCube {
    pub fn into_engine(self) -> (Engine, Arc<InMemoryFactTable>) {
        self.cube.into_engine()
    }
}

/// Literal single-member set.
pub fn set_of(members: &[&MemberRef]) -> Arc<dyn SetCalc> {
    Arc::new(TupleListCalc::of_members(members.iter().map(|m| (*m).clone())))
}

/// Every cell value in ordinal order.
pub fn values(result: &mut QueryResult) -> Vec<CellValue> {
    result
        .cells()
        .unwrap()
        .into_iter()
        .map(|c| c.value().clone())
        .collect()
}

pub fn ints(values: &[i64]) -> Vec<CellValue> {
    values.iter().map(|&v| CellValue::Int(v)).collect()
}
