//! Column bindings between the record structs and their tables.

use sqlx::query_builder::Separated;
use sqlx::Sqlite;

use super::bulk::GazetteerTable;
use super::schema::*;
use super::{fold_case, search_key};
use crate::models::{
    BtaaRegion, Country, FastEntry, GeonamesRecord, WofAncestor, WofConcordance, WofGeoJson,
    WofName, WofPlace,
};

impl GazetteerTable for GeonamesRecord {
    const TABLE: &'static str = GEONAMES_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "geonameid",
        "name",
        "asciiname",
        "alternatenames",
        "latitude",
        "longitude",
        "feature_class",
        "feature_code",
        "country_code",
        "cc2",
        "admin1_code",
        "admin2_code",
        "admin3_code",
        "admin4_code",
        "population",
        "elevation",
        "dem",
        "timezone",
        "modification_date",
        "name_folded",
        "search_folded",
        "created_at",
        "updated_at",
    ];
    const CONFLICT_KEY: &'static [&'static str] = &["geonameid"];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.geonameid)
            .push_bind(self.name.clone())
            .push_bind(self.asciiname.clone())
            .push_bind(self.alternatenames.clone())
            .push_bind(self.latitude)
            .push_bind(self.longitude)
            .push_bind(self.feature_class.clone())
            .push_bind(self.feature_code.clone())
            .push_bind(self.country_code.clone())
            .push_bind(self.cc2.clone())
            .push_bind(self.admin1_code.clone())
            .push_bind(self.admin2_code.clone())
            .push_bind(self.admin3_code.clone())
            .push_bind(self.admin4_code.clone())
            .push_bind(self.population)
            .push_bind(self.elevation)
            .push_bind(self.dem)
            .push_bind(self.timezone.clone())
            .push_bind(self.modification_date)
            .push_bind(fold_case(&self.name))
            .push_bind(search_key([
                Some(self.name.as_str()),
                Some(self.asciiname.as_str()),
                self.alternatenames.as_deref(),
            ]))
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for Country {
    const TABLE: &'static str = COUNTRIES_TABLE;
    const COLUMNS: &'static [&'static str] = &["iso_alpha2", "name", "created_at", "updated_at"];
    const CONFLICT_KEY: &'static [&'static str] = &["iso_alpha2"];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.iso_alpha2.clone())
            .push_bind(self.name.clone())
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for WofPlace {
    const TABLE: &'static str = WOF_SPR_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "wok_id",
        "parent_id",
        "name",
        "placetype",
        "country",
        "repo",
        "latitude",
        "longitude",
        "min_latitude",
        "min_longitude",
        "max_latitude",
        "max_longitude",
        "is_current",
        "is_deprecated",
        "is_ceased",
        "is_superseded",
        "is_superseding",
        "superseded_by",
        "supersedes",
        "lastmodified",
        "name_folded",
        "created_at",
        "updated_at",
    ];
    const CONFLICT_KEY: &'static [&'static str] = &["wok_id"];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.wok_id)
            .push_bind(self.parent_id)
            .push_bind(self.name.clone())
            .push_bind(self.placetype.clone())
            .push_bind(self.country.clone())
            .push_bind(self.repo.clone())
            .push_bind(self.latitude)
            .push_bind(self.longitude)
            .push_bind(self.min_latitude)
            .push_bind(self.min_longitude)
            .push_bind(self.max_latitude)
            .push_bind(self.max_longitude)
            .push_bind(self.is_current)
            .push_bind(self.is_deprecated)
            .push_bind(self.is_ceased)
            .push_bind(self.is_superseded)
            .push_bind(self.is_superseding)
            .push_bind(self.superseded_by)
            .push_bind(self.supersedes)
            .push_bind(self.lastmodified)
            .push_bind(fold_case(&self.name))
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for WofAncestor {
    const TABLE: &'static str = WOF_ANCESTORS_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "wok_id",
        "ancestor_id",
        "ancestor_placetype",
        "lastmodified",
        "created_at",
        "updated_at",
    ];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.wok_id)
            .push_bind(self.ancestor_id)
            .push_bind(self.ancestor_placetype.clone())
            .push_bind(self.lastmodified)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for WofConcordance {
    const TABLE: &'static str = WOF_CONCORDANCES_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "wok_id",
        "other_id",
        "other_source",
        "lastmodified",
        "created_at",
        "updated_at",
    ];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.wok_id)
            .push_bind(self.other_id.clone())
            .push_bind(self.other_source.clone())
            .push_bind(self.lastmodified)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for WofGeoJson {
    const TABLE: &'static str = WOF_GEOJSON_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "wok_id",
        "body",
        "source",
        "alt_label",
        "is_alt",
        "lastmodified",
        "created_at",
        "updated_at",
    ];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.wok_id)
            .push_bind(self.body.clone())
            .push_bind(self.source.clone())
            .push_bind(self.alt_label.clone())
            .push_bind(self.is_alt)
            .push_bind(self.lastmodified)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for WofName {
    const TABLE: &'static str = WOF_NAMES_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "wok_id",
        "placetype",
        "country",
        "language",
        "extlang",
        "script",
        "region",
        "variant",
        "extension",
        "privateuse",
        "name",
        "lastmodified",
        "created_at",
        "updated_at",
    ];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.wok_id)
            .push_bind(self.placetype.clone())
            .push_bind(self.country.clone())
            .push_bind(self.language.clone())
            .push_bind(self.extlang.clone())
            .push_bind(self.script.clone())
            .push_bind(self.region.clone())
            .push_bind(self.variant.clone())
            .push_bind(self.extension.clone())
            .push_bind(self.privateuse.clone())
            .push_bind(self.name.clone())
            .push_bind(self.lastmodified)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for BtaaRegion {
    const TABLE: &'static str = BTAA_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "fast_area",
        "bounding_box",
        "geometry",
        "geonames_id",
        "state_abbv",
        "state_name",
        "county_fips",
        "statefp",
        "namelsad",
        "search_folded",
        "created_at",
        "updated_at",
    ];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.fast_area.clone())
            .push_bind(self.bounding_box.clone())
            .push_bind(self.geometry.clone())
            .push_bind(self.geonames_id.clone())
            .push_bind(self.state_abbv.clone())
            .push_bind(self.state_name.clone())
            .push_bind(self.county_fips.clone())
            .push_bind(self.statefp.clone())
            .push_bind(self.namelsad.clone())
            .push_bind(search_key([
                Some(self.fast_area.as_str()),
                self.state_name.as_deref(),
                self.namelsad.as_deref(),
            ]))
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}

impl GazetteerTable for FastEntry {
    const TABLE: &'static str = FAST_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "fast_id",
        "uri",
        "type",
        "label",
        "geoname_id",
        "viaf_id",
        "wikipedia_id",
        "created_at",
        "updated_at",
    ];
    const CONFLICT_KEY: &'static [&'static str] = &["fast_id"];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.fast_id.clone())
            .push_bind(self.uri.clone())
            .push_bind(self.entry_type.clone())
            .push_bind(self.label.clone())
            .push_bind(self.geoname_id.clone())
            .push_bind(self.viaf_id.clone())
            .push_bind(self.wikipedia_id.clone())
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}
