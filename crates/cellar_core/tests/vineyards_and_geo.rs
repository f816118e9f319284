use cellar_core::{
    Entity, GeoLocation, Store, StoreConfig, Vineyard, VineyardFilters, VineyardRecord, Wine,
    WineRecord, UNPERSISTED_KEY,
};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

const PLACES_CSV: &str = "name,latitude,longitude
Bordeaux, 44.84, -0.58
Napa Valley,38.50,-122.27
Tanunda,-34.52,138.96
";

fn store() -> Store {
    Store::open_in_memory(StoreConfig::default()).unwrap()
}

fn vineyard(name: &str, address: &str, region: &str) -> VineyardRecord {
    VineyardRecord {
        name: name.to_string(),
        address: address.to_string(),
        region: region.to_string(),
        website: format!("https://{}.example", name.to_lowercase()),
        ..VineyardRecord::default()
    }
}

#[test]
fn csv_seeding_runs_once() {
    let store = store();
    let geo = store.geolocations();
    assert!(!geo.has_data());

    let report = geo.seed_from_csv(PLACES_CSV.as_bytes());
    assert!(report.completed);
    assert_eq!(report.rows_affected, 3);
    assert_eq!(geo.get("Bordeaux"), Some(GeoLocation::new(44.84, -0.58)));
    assert!(geo.get("Mendoza").is_none());

    let again = geo.seed_from_csv("name,latitude,longitude\nMendoza,-32.89,-68.84\n".as_bytes());
    assert!(again.completed);
    assert_eq!(again.rows_affected, 0);
    assert_eq!(geo.count(), 3);
}

#[test]
fn malformed_csv_writes_nothing() {
    let store = store();
    let report = store
        .geolocations()
        .seed_from_csv("name,latitude,longitude\nNowhere,north,east\n".as_bytes());
    assert!(!report.completed);
    assert_eq!(store.geolocations().count(), 0);
}

#[test]
fn resolver_only_sees_unknown_names() {
    let store = store();
    let geo = store.geolocations();
    let mut known = BTreeMap::new();
    known.insert("Bordeaux".to_string(), GeoLocation::new(44.84, -0.58));
    assert!(geo.add_all(&known).completed);

    let names: BTreeSet<String> = ["Bordeaux", "Otago", "Atlantis"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(geo.existing_names(&names).len(), 1);

    let asked = std::cell::RefCell::new(Vec::new());
    let resolver = |name: &str| {
        asked.borrow_mut().push(name.to_string());
        (name == "Otago").then(|| GeoLocation::new(-45.0, 169.3))
    };
    assert_eq!(geo.add_resolved(&names, &resolver), 1);
    assert_eq!(*asked.borrow(), vec!["Atlantis", "Otago"]);
    assert_eq!(geo.get("Otago"), Some(GeoLocation::new(-45.0, 169.3)));
    assert_eq!(geo.count(), 2);
}

#[test]
fn wines_and_vineyards_pick_up_coordinates_by_place_name() {
    let store = store();
    store.geolocations().seed_from_csv(PLACES_CSV.as_bytes());

    let wine = Wine::new(WineRecord {
        region: "BORDEAUX".to_string(),
        ..WineRecord::titled("Pauillac 2016")
    });
    store.wines().add(&wine);
    let placeless = Wine::new(WineRecord::titled("Somewhere 2016"));
    store.wines().add(&placeless);
    let estate = Vineyard::new(vineyard("Estate", "tanunda", "Barossa"));
    store.vineyards().add(&estate);
    let (wine_id, placeless_id, estate_id) = (wine.key(), placeless.key(), estate.key());
    drop((wine, placeless, estate));

    let wine = store.wines().get_by_id(wine_id).unwrap();
    assert_eq!(wine.geolocation(), Some(GeoLocation::new(44.84, -0.58)));
    assert!(store.wines().get_by_id(placeless_id).unwrap().geolocation().is_none());
    let estate = store.vineyards().get_by_id(estate_id).unwrap();
    assert_eq!(estate.geolocation(), Some(GeoLocation::new(-34.52, 138.96)));
}

#[test]
fn vineyards_are_cached_filtered_and_written_through() {
    let store = store();
    let vineyards = store.vineyards();
    assert!(!vineyards.has_data());

    let report = vineyards.add_all(&[
        vineyard("Yalumba", "Angaston", "Barossa"),
        vineyard("Henschke", "Keyneton", "Eden Valley"),
        vineyard("Seppeltsfield", "Seppeltsfield", "Barossa"),
    ]);
    assert!(report.completed);
    assert!(vineyards.has_data());

    let barossa = VineyardFilters {
        region: "baro".to_string(),
        ..VineyardFilters::default()
    };
    assert_eq!(vineyards.get_count(Some(&barossa)), 2);
    let page = vineyards.get_all_in_range(1, 5, Some(&barossa));
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name.get(), "Seppeltsfield");

    let yalumba = vineyards.get_by_name("Yalumba").unwrap();
    assert!(Rc::ptr_eq(&yalumba, &vineyards.get_by_id(yalumba.key()).unwrap()));
    yalumba.region.set("Eden Valley".to_string());
    assert_eq!(vineyards.get_count(Some(&barossa)), 1);

    vineyards.update_uniques();
    let stats = vineyards.stats();
    assert_eq!(stats.names.len(), 3);
    assert_eq!(
        stats.regions.iter().cloned().collect::<Vec<_>>(),
        vec!["Barossa".to_string(), "Eden Valley".to_string()]
    );

    assert!(vineyards.remove(&yalumba));
    assert_eq!(yalumba.key(), UNPERSISTED_KEY);
    assert!(vineyards.remove_all());
    assert!(!vineyards.has_data());
    assert!(vineyards.cache().is_empty());
}

#[test]
fn vineyard_replace_all_is_atomic() {
    let store = store();
    let vineyards = store.vineyards();
    let kept = Vineyard::new(vineyard("Kept", "Here", "There"));
    vineyards.add(&kept);

    store
        .database()
        .connection()
        .execute_batch(
            "CREATE TRIGGER no_blank_names BEFORE INSERT ON VINEYARD
             WHEN NEW.NAME = '' BEGIN SELECT RAISE(ABORT, 'blank name'); END;",
        )
        .unwrap();

    let report = vineyards.replace_all(&[vineyard("Fine", "A", "B"), vineyard("", "C", "D")]);
    assert!(!report.completed);
    assert_eq!(report.rows_affected, 0);
    assert!(kept.is_persisted());
    assert_eq!(vineyards.get_count(None), 1);
}
