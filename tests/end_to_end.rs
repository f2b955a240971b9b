use std::fs;
use std::path::Path;

use sqlx::Row;

use gazetteer::search::{HitAttributes, Page};
use gazetteer::store::{
    BTAA_TABLE, FAST_TABLE, GEONAMES_TABLE, WOF_ANCESTORS_TABLE, WOF_NAMES_TABLE, WOF_SPR_TABLE,
};
use gazetteer::{
    import_sources, Config, GazetteerContext, GazetteerSource, GazetteerStore, ImportStatus,
    SearchRequest,
};

const GEONAMES: &str = "\
5037649\tMinneapolis\tMinneapolis\tMinneapolis,Mpls\t44.97997\t-93.26384\tP\tPPLA\tUS\t\tMN\t053\t\t\t429606\t264\t262\tAmerica/Chicago\t2023-04-05
5045360\tSaint Paul\tSaint Paul\t\t44.94441\t-93.09327\tP\tPPLA\tUS\t\tMN\t123\t\t\t311527\t214\t218\tAmerica/Chicago\t2023-04-05
5037784\tMinnehaha Creek\tMinnehaha Creek\t\t44.91496\t-93.20939\tH\tSTM\tUS\t\tMN\t053\t\t\t0\t\t246\tAmerica/Chicago\t2006-01-15
";

const COUNTRY_INFO: &str = "#ISO\tISO3\tISO-Numeric\tfips\tCountry\nUS\tUSA\t840\tUS\tUnited States\n";

const BTAA: &str = "\
Fast,Bounding Box,Geometry,GeoNames ID,State Abbv,State Name,County_FIPS,STATEFP,NAMELSAD
Minnesota,,,5037779,mn,Minnesota,,27,
Wisconsin,,,5279468,WI,Wisconsin,,55,
Hennepin County (Minn.),,,,MN,,27053,27,Hennepin County
";

const WOF_SPR: &str = "\
id,parent_id,name,placetype,country,repo,latitude,longitude
85953041,85688727,Minneapolis,locality,US,whosonfirst-data-admin-us,44.96,-93.26
";

const WOF_ANCESTORS: &str = "\
id,ancestor_id,ancestor_placetype,lastmodified
85953041,85688727,region,1700000000
85953041,85633793,country,1700000000
";

const WOF_NAMES: &str = "\
id,placetype,country,language,extlang,script,region,variant,extension,privateuse,name,lastmodified
85953041,locality,US,eng,,,,,,,Minneapolis,1700000000
85953041,locality,US,fra,,,,,,,Minnéapolis,1700000000
";

const FAST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<collection xmlns="http://www.loc.gov/MARC21/slim">
  <record>
    <controlfield tag="001">fst01204592</controlfield>
    <datafield tag="016" ind1="7" ind2=" "><subfield code="a">fst01204592</subfield></datafield>
    <datafield tag="151" ind1=" " ind2=" "><subfield code="a">Minnesota</subfield><subfield code="z">Minneapolis</subfield></datafield>
  </record>
  <record>
    <controlfield tag="001">nothing</controlfield>
    <datafield tag="151" ind1=" " ind2=" "><subfield code="a">No Identifier</subfield></datafield>
  </record>
</collection>"#;

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn seed(root: &Path) {
    write(&root.join("geonames/US.txt"), GEONAMES);
    write(&root.join("geonames/countryInfo.txt"), COUNTRY_INFO);
    write(&root.join("btaa/btaa_regions.csv"), BTAA);
    write(&root.join("wof/spr/spr.csv"), WOF_SPR);
    write(&root.join("wof/ancestors/ancestors.csv"), WOF_ANCESTORS);
    write(&root.join("wof/names/names.csv"), WOF_NAMES);
    write(&root.join("fast/FASTGeographic.marcxml"), FAST);
}

/// Every row of `table` as text, minus the import timestamps.
async fn table_rows(store: &GazetteerStore, table: &str) -> Vec<Vec<Option<String>>> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(store.pool())
            .await
            .unwrap();
    let columns: Vec<String> = columns
        .into_iter()
        .filter(|c| c != "created_at" && c != "updated_at")
        .collect();
    let select = columns
        .iter()
        .map(|c| format!("CAST({c} AS TEXT)"))
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query(&format!("SELECT {select} FROM {table} ORDER BY 1"))
        .fetch_all(store.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| row.try_get::<Option<String>, _>(i).unwrap())
                .collect()
        })
        .collect()
}

async fn snapshot(store: &GazetteerStore) -> Vec<(String, Vec<Vec<Option<String>>>)> {
    let mut tables = Vec::new();
    for table in store.table_counts().await.unwrap().into_keys() {
        tables.push((table.to_string(), table_rows(store, table).await));
    }
    tables
}

async fn context() -> GazetteerContext {
    let store = GazetteerStore::in_memory().await.unwrap();
    GazetteerContext::with_store(Config::default(), store).unwrap()
}

#[tokio::test]
async fn test_import_then_lookup_minneapolis() {
    let data = tempfile::tempdir().unwrap();
    seed(data.path());
    let ctx = context().await;

    let summary = import_sources(&ctx, &[GazetteerSource::Geonames], data.path(), false)
        .await
        .unwrap();
    assert_eq!(summary.status, ImportStatus::Success);
    assert_eq!(summary.total_records, 3);

    let result = ctx
        .lookup()
        .lookup_place("Minneapolis", Some("city"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.record.geonameid, 5037649);
    assert_eq!(result.record.population, Some(429606));
    assert_eq!(result.confidence, 1.0);
    assert_eq!(result.place_type, "capital");
    assert_eq!(result.country.as_deref(), Some("United States"));

    let creek = ctx
        .lookup()
        .lookup_place("minnehaha", Some("river"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(creek.place_type, "stream");
    assert!((0.0..=1.0).contains(&creek.confidence));

    assert!(ctx
        .lookup()
        .lookup_place("Gotham", None, None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_btaa_search_minnesota() {
    let data = tempfile::tempdir().unwrap();
    seed(data.path());
    let ctx = context().await;
    import_sources(&ctx, &[GazetteerSource::Btaa], data.path(), false)
        .await
        .unwrap();

    let request = SearchRequest {
        q: Some("minnesota".to_string()),
        gazetteer: Some("btaa".to_string()),
        state_abbv: Some("wi".to_string()),
        ..Default::default()
    };
    let response = ctx.search().search_gazetteers(&request).await.unwrap();
    assert!(response.data.is_empty());
    assert_eq!(response.meta.total_count, 0);

    let request = SearchRequest {
        q: Some("minnesota".to_string()),
        gazetteer: Some("btaa".to_string()),
        ..Default::default()
    };
    let response = ctx.search().search_gazetteers(&request).await.unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.meta.total_count, 1);
    assert_eq!(response.meta.gazetteers_searched, vec!["btaa"]);
    assert_eq!(response.data[0].source.as_deref(), Some("btaa"));
    match &response.data[0].attributes {
        HitAttributes::Btaa(region) => {
            assert_eq!(region.fast_area, "Minnesota");
            assert_eq!(region.state_abbv.as_deref(), Some("MN"));
        }
        other => panic!("expected a BTAA region, got {:?}", other),
    }

    let request = SearchRequest {
        state_abbv: Some("mn".to_string()),
        page: Page { offset: 0, limit: 1 },
        ..request
    };
    let response = ctx.search().search_gazetteers(&request).await.unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.meta.total_count, 1);
}

#[tokio::test]
async fn test_search_all_with_btaa_only_match() {
    let data = tempfile::tempdir().unwrap();
    seed(data.path());
    let ctx = context().await;
    let sources = GazetteerSource::parse_list(&["all"]).unwrap();
    let summary = import_sources(&ctx, &sources, data.path(), false)
        .await
        .unwrap();
    assert_eq!(summary.sources, vec!["geonames", "wof", "btaa", "fast"]);
    assert_eq!(summary.results["fast"].records_processed, 1);
    assert_eq!(summary.results["fast"].records_skipped, 1);
    assert_eq!(ctx.store.table_count(WOF_SPR_TABLE).await.unwrap(), 1);

    let request = SearchRequest {
        q: Some("Hennepin".to_string()),
        gazetteer: Some("all".to_string()),
        ..Default::default()
    };
    let response = ctx.search().search_gazetteers(&request).await.unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.meta.total_count, 1);
    assert!(response
        .data
        .iter()
        .all(|hit| hit.source.as_deref() == Some("btaa")));
    assert_eq!(response.meta.source_totals["geonames"], 0);
    assert_eq!(response.meta.source_totals["wof"], 0);
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let data = tempfile::tempdir().unwrap();
    seed(data.path());
    let ctx = context().await;
    let sources = GazetteerSource::parse_list(&["all"]).unwrap();

    import_sources(&ctx, &sources, data.path(), false)
        .await
        .unwrap();
    let first = snapshot(&ctx.store).await;

    import_sources(&ctx, &sources, data.path(), false)
        .await
        .unwrap();
    let second = snapshot(&ctx.store).await;

    assert_eq!(first, second);

    let counts = ctx.store.table_counts().await.unwrap();
    assert_eq!(counts[GEONAMES_TABLE], 3);
    assert_eq!(counts[BTAA_TABLE], 3);
    assert_eq!(counts[FAST_TABLE], 1);
    assert_eq!(counts[WOF_ANCESTORS_TABLE], 2);
    assert_eq!(counts[WOF_NAMES_TABLE], 2);

    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM gazetteer_wof_names ORDER BY id")
        .fetch_all(ctx.store.pool())
        .await
        .unwrap();
    assert_eq!(ids, vec![1, 2]);
}
