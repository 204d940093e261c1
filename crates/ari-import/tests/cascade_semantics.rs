use ari_core::identity::{derive_id, EntityType};
use ari_import::plan::{disclosure_id, disclosure_version_id, BusinessScopedIds};
use ari_import::policy::FieldValue;
use ari_import::store::MemoryTables;
use ari_import::{import_batch, read_batch, ImportRecord, MemoryDatabase};

const HEADER: &str = "name,state,locality,postcode,credential_type,credential_number,abn,acn,lat,lng\n";

fn records(rows: &str) -> Vec<ImportRecord> {
    let text = format!("{HEADER}{rows}");
    let batch = read_batch(text.as_bytes()).expect("candidate csv");
    assert_eq!(batch.invalid, 0, "fixture rows must validate");
    batch.records
}

fn text(value: Option<&FieldValue>) -> Option<&str> {
    value.and_then(FieldValue::as_text)
}

#[tokio::test]
async fn failing_record_rolls_back_the_whole_batch() {
    let rows = "Acme Finance,VIC,Richmond,3121,acl,123456,12345678901,,-37.8183,144.998\n\
Harbour Brokers,NSW,Sydney,2000,acl,456789,55666777888,,-33.8688,151.2093\n\
Jane Citizen,VIC,Cremorne,3121,acr,500100,,987654321,,\n";
    let db = MemoryDatabase::new();

    // seven upserts per record: the third record fails after two have written rows
    let store = db.begin().fail_after_upserts(2 * 7 + 3);
    let err = import_batch(store, &records(rows)).await.unwrap_err();
    assert!(format!("{err:#}").contains("record 3"));
    assert_eq!(db.snapshot().total_rows(), 0);

    let summary = import_batch(db.begin(), &records(rows)).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(db.snapshot().row_count("listings"), 3);
}

#[tokio::test]
async fn verification_level_only_moves_up() {
    let db = MemoryDatabase::new();
    let representative = records("Acme Finance,VIC,Richmond,3121,acr,500100,12345678901,,,\n");
    let licensee = records("Acme Finance,VIC,Richmond,3121,acl,123456,12345678901,,,\n");
    let listing = BusinessScopedIds::for_business(derive_id(EntityType::Business, "12345678901")).listing_id;

    import_batch(db.begin(), &representative).await.unwrap();
    assert_eq!(
        text(db.snapshot().value("listings", listing, "verification_level")),
        Some("registry_matched")
    );

    let promoted = import_batch(db.begin(), &licensee).await.unwrap();
    assert_eq!(promoted.verification_promoted, 1);
    assert_eq!(
        text(db.snapshot().value("listings", listing, "verification_level")),
        Some("licence_verified")
    );

    let weaker = import_batch(db.begin(), &representative).await.unwrap();
    assert_eq!(weaker.verification_promoted, 0);
    assert_eq!(
        text(db.snapshot().value("listings", listing, "verification_level")),
        Some("licence_verified")
    );
}

#[tokio::test]
async fn late_abn_converges_on_business_found_by_acn() {
    let db = MemoryDatabase::new();
    import_batch(
        db.begin(),
        &records("Jane Citizen,VIC,Cremorne,3121,acr,500100,,987654321,,\n"),
    )
    .await
    .unwrap();
    let first_business = derive_id(EntityType::Business, "987654321");

    // the abn now leads the business key, so the derived id changes
    let second = import_batch(
        db.begin(),
        &records("Jane Citizen Lending,VIC,Cremorne,3121,acr,500100,11222333444,987654321,,\n"),
    )
    .await
    .unwrap();
    assert_eq!(second.counts(EntityType::Business).inserted, 0);
    assert_eq!(second.counts(EntityType::Business).updated, 1);
    assert_eq!(second.counts(EntityType::Credential).updated, 1);

    let tables = db.snapshot();
    assert_eq!(tables.row_count("businesses"), 1);
    assert_eq!(tables.row_count("listings"), 1);
    assert_eq!(second.counts(EntityType::Listing).updated, 1);
    assert_eq!(text(tables.value("businesses", first_business, "abn")), Some("11222333444"));
    assert_eq!(
        text(tables.value("businesses", first_business, "legal_name")),
        Some("Jane Citizen Lending")
    );
}

#[tokio::test]
async fn coordinates_are_filled_once_and_kept() {
    let db = MemoryDatabase::new();
    let location = derive_id(EntityType::Location, "VIC|RICHMOND|3121");
    import_batch(db.begin(), &records("A Co,VIC,Richmond,3121,acl,1,,,,\n")).await.unwrap();
    assert_eq!(db.snapshot().value("locations", location, "lat"), Some(&FieldValue::Float(None)));

    import_batch(db.begin(), &records("B Co,VIC,Richmond,3121,acl,2,,,-37.8183,144.998\n"))
        .await
        .unwrap();
    import_batch(db.begin(), &records("C Co,VIC,Richmond,3121,acl,3,,,-37.0,145.0\n"))
        .await
        .unwrap();
    let tables = db.snapshot();
    assert_eq!(tables.row_count("locations"), 1);
    assert_eq!(tables.value("locations", location, "lat"), Some(&FieldValue::Float(Some(-37.8183))));
}

#[tokio::test]
async fn reimport_after_hand_deactivated_disclosure_adds_a_new_version() {
    let db = MemoryDatabase::new();
    let batch = records("Acme Finance,VIC,Richmond,3121,acl,123456,12345678901,,,\n");
    let listing = BusinessScopedIds::for_business(derive_id(EntityType::Business, "12345678901")).listing_id;
    import_batch(db.begin(), &batch).await.unwrap();
    assert!(db.edit("trust_disclosures", disclosure_id(listing), "is_active", false));

    let summary = import_batch(db.begin(), &batch).await.unwrap();
    assert_eq!(summary.counts(EntityType::TrustDisclosure).inserted, 1);
    let replacement = disclosure_version_id(listing, 1);
    let active = |tables: &MemoryTables| {
        tables
            .ids("trust_disclosures")
            .into_iter()
            .filter(|id| tables.value("trust_disclosures", *id, "is_active") == Some(&FieldValue::Bool(Some(true))))
            .collect::<Vec<_>>()
    };
    assert_eq!(active(&db.snapshot()), vec![replacement]);

    // the active replacement is updated in place from now on
    let again = import_batch(db.begin(), &batch).await.unwrap();
    assert_eq!(again.counts(EntityType::TrustDisclosure).updated, 1);
    assert_eq!(db.snapshot().row_count("trust_disclosures"), 2);

    assert!(db.edit("trust_disclosures", replacement, "is_active", false));
    import_batch(db.begin(), &batch).await.unwrap();
    let tables = db.snapshot();
    assert_eq!(tables.row_count("trust_disclosures"), 3);
    assert_eq!(active(&tables), vec![disclosure_version_id(listing, 2)]);
}

#[tokio::test]
async fn acn_held_by_another_business_is_not_copied() {
    let rows = "A Co,VIC,Richmond,3121,acl,1,12345678901,,,\n\
B Co,VIC,Richmond,3121,acl,2,,987654321,,\n\
C Co,VIC,Richmond,3121,acl,3,12345678901,987654321,,\n";
    let db = MemoryDatabase::new();
    let summary = import_batch(db.begin(), &records(rows)).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.registration_conflicts, 1);

    let by_abn = derive_id(EntityType::Business, "12345678901");
    let by_acn = derive_id(EntityType::Business, "987654321");
    let tables = db.snapshot();
    assert_eq!(tables.row_count("businesses"), 2);
    let holders: Vec<_> = tables
        .ids("businesses")
        .into_iter()
        .filter(|id| text(tables.value("businesses", *id, "acn")) == Some("987654321"))
        .collect();
    assert_eq!(holders, vec![by_acn]);
    assert_eq!(text(tables.value("businesses", by_abn, "acn")), None);
    assert_eq!(text(tables.value("businesses", by_abn, "legal_name")), Some("C Co"));

    // the same split keeps committing on every later run
    let rerun = import_batch(db.begin(), &records(rows)).await.unwrap();
    assert_eq!(rerun.total_inserted(), 0);
    assert_eq!(rerun.registration_conflicts, 1);
}
