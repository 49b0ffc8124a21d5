use pricing_tool::{BillOfQuantities, BoqItem, Unit, round2};

fn item(id: &str, quantity: f64, unit_price: f64) -> BoqItem {
    BoqItem::new(id, id, format!("Work package {id}"), Unit::CubicMeter, quantity, unit_price)
}

#[test]
fn total_price_is_always_derived() {
    let line = item("A-1", 250.0, 350.0);
    assert_eq!(line.total_price, 87_500.0);

    let odd = item("A-2", 3.0, 33.335);
    assert_eq!(odd.total_price, round2(3.0 * 33.335));
}

#[test]
fn upsert_recomputes_total_even_when_caller_lies() {
    let mut boq = BillOfQuantities::new();
    let mut line = item("A-1", 10.0, 5.0);
    line.total_price = 9_999.0;
    boq.upsert_item(line).unwrap();
    assert_eq!(boq.get_item("A-1").unwrap().total_price, 50.0);
}

#[test]
fn quantity_and_price_mutations_ripple_into_total() {
    let mut boq = BillOfQuantities::new();
    boq.upsert_item(item("A-1", 10.0, 5.0)).unwrap();

    boq.set_quantity("A-1", 12.5).unwrap();
    assert_eq!(boq.get_item("A-1").unwrap().total_price, 62.5);

    boq.set_unit_price("A-1", 6.4).unwrap();
    assert_eq!(boq.get_item("A-1").unwrap().total_price, 80.0);

    assert_eq!(
        boq.set_quantity("missing", 1.0).unwrap_err().kind(),
        "UnknownResource"
    );
}

#[test]
fn delete_keeps_remaining_rows_in_order() {
    let mut boq = BillOfQuantities::new();
    boq.upsert_item(item("A-1", 1.0, 10.0)).unwrap();
    boq.upsert_item(item("A-2", 2.0, 20.0)).unwrap();
    boq.upsert_item(item("A-3", 3.0, 30.0)).unwrap();

    assert!(boq.delete_item("A-2").unwrap());
    assert!(!boq.delete_item("A-2").unwrap());

    let ids: Vec<String> = boq.items().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["A-1", "A-3"]);
}

#[test]
fn list_items_filters_by_category() {
    let mut boq = BillOfQuantities::new();
    let mut first = item("A-1", 1.0, 10.0);
    first.category = Some("civil".into());
    let mut second = item("A-2", 1.0, 10.0);
    second.category = Some("mep".into());
    boq.upsert_item(first).unwrap();
    boq.upsert_item(second).unwrap();
    boq.upsert_item(item("A-3", 1.0, 10.0)).unwrap();

    assert_eq!(boq.list_items(Some("civil")).unwrap().len(), 1);
    assert_eq!(boq.list_items(None).unwrap().len(), 3);
}

#[test]
fn bulk_import_upserts_in_order() {
    let mut boq = BillOfQuantities::new();
    let rows = vec![item("A-1", 1.0, 10.0), item("A-2", 2.0, 20.0), item("A-1", 5.0, 10.0)];
    assert_eq!(boq.bulk_import(rows).unwrap(), 3);
    assert_eq!(boq.len(), 2);
    assert_eq!(boq.get_item("A-1").unwrap().quantity, 5.0);
}

#[test]
fn empty_boq_rolls_up_to_zero() {
    let boq = BillOfQuantities::new();
    assert!(boq.is_empty());
    assert_eq!(boq.total_value().unwrap(), 0.0);
    assert!(boq.items().unwrap().is_empty());
}

#[test]
fn zero_quantity_and_zero_price_are_legal() {
    let mut boq = BillOfQuantities::new();
    boq.upsert_item(item("A-1", 0.0, 100.0)).unwrap();
    boq.upsert_item(item("A-2", 10.0, 0.0)).unwrap();
    assert_eq!(boq.total_value().unwrap(), 0.0);
}
