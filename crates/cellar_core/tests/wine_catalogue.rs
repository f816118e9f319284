use cellar_core::{
    Entity, Pager, RangeFilter, Store, StoreConfig, Wine, WineFilters, WineRecord,
    UNPERSISTED_KEY,
};
use rusqlite::params;
use std::rc::Rc;

fn store() -> Store {
    Store::open_in_memory(StoreConfig::default()).unwrap()
}

fn uncached_store() -> Store {
    Store::open_in_memory(StoreConfig {
        use_cache: false,
        ..StoreConfig::default()
    })
    .unwrap()
}

fn record(title: &str, country: &str, vintage: i32, price: f64) -> WineRecord {
    WineRecord {
        title: title.to_string(),
        country: country.to_string(),
        winery: format!("{title} Estate"),
        color: "Red".to_string(),
        vintage,
        score: 90,
        abv: 13.5,
        price,
        ..WineRecord::default()
    }
}

fn add(store: &Store, record: WineRecord) -> Rc<Wine> {
    let wine = Wine::new(record);
    assert!(store.wines().add(&wine));
    wine
}

fn stored_title(store: &Store, id: i64) -> String {
    store
        .database()
        .connection()
        .query_row("SELECT TITLE FROM WINE WHERE ID = ?1", params![id], |row| {
            row.get(0)
        })
        .unwrap()
}

#[test]
fn add_assigns_key_and_registers_instance() {
    let store = store();
    let wine = add(&store, record("Margaux 2015", "France", 2015, 80.0));

    assert!(wine.is_persisted());
    let fetched = store.wines().get_by_id(wine.key()).unwrap();
    assert!(Rc::ptr_eq(&fetched, &wine));
    assert!(store.wines().get_by_id(wine.key() + 100).is_none());
}

#[test]
fn repeated_reads_share_one_instance() {
    let store = store();
    let id = add(&store, record("Barolo 2016", "Italy", 2016, 55.0)).key();

    let first = store.wines().get_by_id(id).unwrap();
    let second = store.wines().get_by_id(id).unwrap();
    let from_all = store.wines().get_all().into_iter().next().unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert!(Rc::ptr_eq(&first, &from_all));
}

#[test]
fn cache_hit_ignores_newer_row_values() {
    let store = store();
    let wine = add(&store, record("Rioja 2018", "Spain", 2018, 20.0));
    store
        .database()
        .connection()
        .execute(
            "UPDATE WINE SET TITLE = 'Changed elsewhere' WHERE ID = ?1",
            params![wine.key()],
        )
        .unwrap();

    let fetched = store.wines().get_by_id(wine.key()).unwrap();
    assert_eq!(fetched.title.get(), "Rioja 2018");
}

#[test]
fn disabled_cache_returns_fresh_instances() {
    let store = uncached_store();
    let id = add(&store, record("Chianti 2019", "Italy", 2019, 18.0)).key();

    let first = store.wines().get_by_id(id).unwrap();
    let second = store.wines().get_by_id(id).unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(first.title.get(), second.title.get());
    assert!(store.wines().cache().is_empty());
}

#[test]
fn dropped_instances_are_reloaded_from_storage() {
    let store = store();
    let id = add(&store, record("Tokaji 2013", "Hungary", 2013, 40.0)).key();
    assert_eq!(store.wines().cache().live_count(), 0);

    let reloaded = store.wines().get_by_id(id).unwrap();
    assert_eq!(reloaded.title.get(), "Tokaji 2013");
    assert_eq!(store.wines().cache().live_count(), 1);
}

#[test]
#[should_panic(expected = "identity cache consistency violation")]
fn registering_a_second_live_instance_panics() {
    let store = store();
    let wine = add(&store, record("Port 2000", "Portugal", 2000, 60.0));
    let impostor = Wine::new(record("Port 2000", "Portugal", 2000, 60.0));
    store.wines().cache().register(wine.key(), &impostor);
}

#[test]
fn field_changes_write_through_one_statement_each() {
    let store = store();
    let wine = add(&store, record("Sancerre 2021", "France", 2021, 25.0));

    let before = store.database().statement_count();
    assert!(wine.title.set("Sancerre Blanc 2021".to_string()));
    assert_eq!(store.database().statement_count(), before + 1);
    assert_eq!(stored_title(&store, wine.key()), "Sancerre Blanc 2021");

    // Same value: no change, no statement.
    assert!(!wine.title.set("Sancerre Blanc 2021".to_string()));
    assert_eq!(store.database().statement_count(), before + 1);

    wine.price.set(27.5);
    wine.vintage.set(2022);
    let (price, vintage): (f64, i32) = store
        .database()
        .connection()
        .query_row(
            "SELECT PRICE, VINTAGE FROM WINE WHERE ID = ?1",
            params![wine.key()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((price, vintage), (27.5, 2022));
}

#[test]
fn written_values_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cellar.db");

    let id = {
        let store = Store::open(&path, StoreConfig::default()).unwrap();
        let wine = add(&store, record("Priorat 2017", "Spain", 2017, 35.0));
        wine.description.set("Dark fruit and slate".to_string());
        wine.key()
    };

    let store = Store::open(&path, StoreConfig::default()).unwrap();
    let wine = store.wines().get_by_id(id).unwrap();
    assert_eq!(wine.description.get(), "Dark fruit and slate");
}

#[test]
fn unpersisted_changes_never_touch_storage() {
    let store = store();
    let loose = Wine::new(WineRecord::titled("Loose 2019"));
    let before = store.database().statement_count();
    loose.title.set("Still loose".to_string());
    assert_eq!(store.database().statement_count(), before);

    let removed = add(&store, record("Gone 2010", "Chile", 2010, 9.0));
    assert!(store.wines().remove(&removed));
    assert_eq!(removed.key(), UNPERSISTED_KEY);

    let before = store.database().statement_count();
    removed.title.set("Edited after delete".to_string());
    assert_eq!(store.database().statement_count(), before);
    assert_eq!(store.wines().get_count(None), 0);
}

#[test]
fn removed_wine_can_be_added_again() {
    let store = store();
    let wine = add(&store, record("Again 2012", "Chile", 2012, 12.0));
    let old_id = wine.key();
    assert!(store.wines().remove(&wine));
    assert!(!store.wines().remove(&wine));

    assert!(store.wines().add(&wine));
    assert_ne!(wine.key(), old_id);
    assert!(!store.wines().add(&wine));

    let before = store.database().statement_count();
    wine.title.set("Again Reserve 2012".to_string());
    assert_eq!(store.database().statement_count(), before + 1);
    assert_eq!(stored_title(&store, wine.key()), "Again Reserve 2012");
}

#[test]
fn failed_write_keeps_in_memory_value() {
    let store = store();
    let wine = add(&store, record("Locked 2011", "France", 2011, 30.0));
    store
        .database()
        .connection()
        .execute_batch(
            "CREATE TRIGGER lock_titles BEFORE UPDATE OF TITLE ON WINE
             BEGIN SELECT RAISE(ABORT, 'titles are locked'); END;",
        )
        .unwrap();

    wine.title.set("Unlocked 2011".to_string());

    assert_eq!(wine.title.get(), "Unlocked 2011");
    assert_eq!(stored_title(&store, wine.key()), "Locked 2011");
}

#[test]
fn default_filters_match_every_row() {
    let store = store();
    add(&store, record("Known 2001", "France", 2001, 10.0));
    add(&store, record("Unknown vintage", "", 0, 0.0));
    add(&store, record("Missing vintage", "Italy", -1, 5.0));

    let everything = WineFilters::default();
    assert_eq!(store.wines().get_count(None), 3);
    assert_eq!(store.wines().get_count(Some(&everything)), 3);
    assert_eq!(
        store.wines().get_all_in_range(0, 10, Some(&everything)).len(),
        3
    );
}

#[test]
fn filters_combine_substring_and_range_predicates() {
    let store = store();
    add(&store, record("Bordeaux Rouge 2005", "France", 2005, 45.0));
    add(&store, record("Bordeaux Blanc 2019", "France", 2019, 22.0));
    add(&store, record("Barossa Shiraz 2019", "Australia", 2019, 30.0));

    let filters = WineFilters {
        country: "fra".to_string(),
        vintage: RangeFilter::at_least(2010),
        ..WineFilters::default()
    };
    let wines = store.wines().get_all_in_range(0, 10, Some(&filters));
    let titles: Vec<String> = wines.iter().map(|wine| wine.title.get()).collect();
    assert_eq!(titles, vec!["Bordeaux Blanc 2019"]);

    let pricey = WineFilters {
        price: RangeFilter::between(25.0, 50.0),
        ..WineFilters::default()
    };
    assert_eq!(store.wines().get_count(Some(&pricey)), 2);
}

#[test]
fn ranges_page_through_key_order() {
    let store = store();
    let records: Vec<WineRecord> = (0..25)
        .map(|n| record(&format!("Wine {n:02}"), "France", 2000, 10.0))
        .collect();
    assert!(store.wines().add_all(&records).completed);

    let wines = store.wines();
    assert_eq!(wines.get_all_in_range(0, 10, None).len(), 10);
    let tail = wines.get_all_in_range(20, 30, None);
    assert_eq!(tail.len(), 5);
    assert_eq!(tail[0].title.get(), "Wine 20");
    assert!(wines.get_all_in_range(30, 40, None).is_empty());
    assert!(wines.get_all_in_range(10, 5, None).is_empty());

    let pager = Pager::new(wines, 10);
    assert_eq!(pager.page_count(), 3);
    assert_eq!(pager.page(1)[0].title.get(), "Wine 10");
    assert_eq!(pager.page(2).len(), 5);
}

#[test]
fn statistics_refresh_only_on_request() {
    let store = store();
    let wines = store.wines();
    add(&store, record("A", "France", 0, 12.0));
    add(&store, record("B", "Italy", -1, 8.0));
    add(&store, record("C", "France", 1999, 99.0));
    add(&store, record("D", "", 2020, 30.0));

    assert!(wines.stats().countries.is_empty());
    wines.update_uniques();

    let stats = wines.stats();
    assert_eq!(
        stats.countries.iter().cloned().collect::<Vec<_>>(),
        vec!["France".to_string(), "Italy".to_string()]
    );
    assert_eq!(stats.vintage.min, Some(1999));
    assert_eq!(stats.vintage.max, Some(2020));
    assert_eq!(stats.price.min, Some(8.0));
    assert_eq!(stats.price.max, Some(99.0));

    assert!(wines.remove_all());
    assert_eq!(wines.stats(), stats);
    wines.update_uniques();
    assert!(wines.stats().countries.is_empty());
    assert_eq!(wines.stats().vintage.max, None);
}

#[test]
fn unknown_vintages_only_raise_the_maximum() {
    let store = store();
    add(&store, record("NV", "France", 0, 12.0));
    add(&store, record("NV2", "France", -1, 12.0));
    store.wines().update_uniques();

    let stats = store.wines().stats();
    assert_eq!(stats.vintage.min, None);
    assert_eq!(stats.vintage.max, Some(0));
}

#[test]
fn bulk_insert_flushes_in_configured_batches() {
    let store = store();
    let records: Vec<WineRecord> = (0..5000)
        .map(|n| WineRecord::titled(format!("Bulk {n} {}", 1900 + n % 100)))
        .collect();

    let report = store.wines().add_all(&records);
    assert!(report.completed);
    assert_eq!(report.rows_affected, 5000);
    assert_eq!(report.flushed_batches, vec![2048, 2048, 904]);
    assert_eq!(store.wines().get_all().len(), 5000);
    assert_eq!(store.wines().get_by_id(1).unwrap().vintage.get(), 1900);
}

#[test]
fn replace_all_swaps_rows_and_resets_live_keys() {
    let store = Store::open_in_memory(StoreConfig {
        batch_size: 2,
        ..StoreConfig::default()
    })
    .unwrap();
    let old = add(&store, record("Old 1990", "France", 1990, 50.0));

    let report = store.wines().replace_all(&[
        WineRecord::titled("New 2020"),
        WineRecord::titled("New 2021"),
        WineRecord::titled("New 2022"),
    ]);
    assert!(report.completed);
    assert_eq!(report.flushed_batches, vec![2, 1]);
    assert_eq!(old.key(), UNPERSISTED_KEY);

    let titles: Vec<String> = store
        .wines()
        .get_all()
        .iter()
        .map(|wine| wine.title.get())
        .collect();
    assert_eq!(titles, vec!["New 2020", "New 2021", "New 2022"]);
}

#[test]
fn storage_failures_surface_as_empty_results() {
    let store = store();
    add(&store, record("Hidden 2000", "France", 2000, 10.0));
    let conn = store.database().connection();
    conn.execute_batch("ALTER TABLE WINE RENAME TO WINE_ARCHIVE;")
        .unwrap();

    assert!(store.wines().get_all().is_empty());
    assert!(store.wines().get_by_id(1).is_none());
    assert_eq!(store.wines().get_count(None), -1);

    conn.execute_batch("ALTER TABLE WINE_ARCHIVE RENAME TO WINE;")
        .unwrap();
    assert_eq!(store.wines().get_all().len(), 1);
}
