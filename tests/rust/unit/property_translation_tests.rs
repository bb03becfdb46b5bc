//! Property path translation against the transport fixture mapping
//!
//! Covers alias reuse across a translation, join de-duplication and the
//! failure taxonomy of the resolver.

#[cfg(test)]
mod property_translation_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use featurestore::feature_catalog::{FeatureMappingConfig, MappingError, MappingModel};
    use featurestore::query_translator::{MappedValueKind, PropertyNameMapper};

    const FIXTURE: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/transport_mapping.yaml"
    );

    fn model() -> MappingModel {
        let _ = env_logger::builder().is_test(true).try_init();
        FeatureMappingConfig::from_yaml_file(FIXTURE)
            .expect("fixture should parse")
            .to_mapping_model()
            .expect("fixture should be a valid mapping")
    }

    /// Resolving the same path twice yields the same column and no new joins
    #[test]
    fn test_repeated_resolution_is_idempotent() {
        let model = model();
        let mut mapper = PropertyNameMapper::new(&model);

        let first = mapper
            .map_property_str("app:Road", "app:address/app:city")
            .unwrap();
        let joins_after_first = mapper.joins().to_vec();
        let second = mapper
            .map_property_str("app:Road", "app:address/app:city")
            .unwrap();

        assert_eq!(first.column_ref(), second.column_ref());
        assert_eq!(first.table_alias, second.table_alias);
        assert_eq!(first.new_joins.len(), 2);
        assert!(second.new_joins.is_empty());
        assert_eq!(mapper.joins(), joins_after_first.as_slice());
    }

    /// Paths sharing a prefix share its alias; diverging suffixes do not
    #[test]
    fn test_shared_prefix_shares_alias() {
        let model = model();
        let mut mapper = PropertyNameMapper::new(&model);

        let street = mapper
            .map_property_str("app:Road", "app:address/app:street")
            .unwrap();
        let postcode = mapper
            .map_property_str("app:Road", "app:address/app:postcode")
            .unwrap();
        let city = mapper
            .map_property_str("app:Road", "app:address/app:city")
            .unwrap();

        assert_eq!(street.table_alias, postcode.table_alias);
        assert_ne!(street.table_alias, city.table_alias);
        assert_eq!(street.new_joins.len(), 1);
        assert!(postcode.new_joins.is_empty());
        assert_eq!(city.new_joins.len(), 1);
        assert_eq!(city.new_joins[0].source_alias, street.table_alias);

        let rendered: Vec<String> = mapper.joins().iter().map(|j| j.to_sql()).collect();
        let distinct: HashSet<&String> = rendered.iter().collect();
        assert_eq!(rendered.len(), 2);
        assert_eq!(distinct.len(), 2);
    }

    /// The same table reached through two different properties is joined twice
    #[test]
    fn test_same_table_different_paths() {
        let model = model();
        let mut mapper = PropertyNameMapper::new(&model);

        let operator = mapper.map_property_str("app:Road", "app:operator").unwrap();
        let maintainer = mapper
            .map_property_str("app:Road", "app:maintainer")
            .unwrap();

        assert_ne!(operator.table_alias, maintainer.table_alias);
        assert_eq!(operator.column, maintainer.column);
        assert_eq!(
            mapper.from_clause("app:Road").unwrap(),
            "roads AS road_1 \
             LEFT OUTER JOIN organisations AS orga_2 ON road_1.operator_id = orga_2.id \
             LEFT OUTER JOIN organisations AS orga_3 ON road_1.maintainer_id = orga_3.id"
        );
    }

    /// An unmapped property fails without touching the alias space
    #[test]
    fn test_unmapped_property_allocates_nothing() {
        let model = model();
        let mut mapper = PropertyNameMapper::new(&model);

        let result = mapper.map_property_str("app:Road", "app:speedLimit");
        assert_eq!(
            result,
            Err(MappingError::UnmappableProperty {
                feature_type: "app:Road".to_string(),
                path: "app:speedLimit".to_string(),
            })
        );
        assert!(mapper.alias_manager().is_empty());
        assert!(mapper.joins().is_empty());

        assert!(matches!(
            mapper.map_property_str("app:Road", "app:address/app:country"),
            Err(MappingError::UnmappableProperty { .. })
        ));
        assert!(mapper.alias_manager().is_empty());
    }

    #[test]
    fn test_unsupported_kinds_and_operations() {
        let model = model();
        let mut mapper = PropertyNameMapper::new(&model);

        assert!(matches!(
            mapper.map_property_str("app:Road", "app:centreline"),
            Err(MappingError::UnsupportedPropertyKind { .. })
        ));

        let geometry = mapper.map_property_str("app:Road", "app:geometry").unwrap();
        assert_eq!(geometry.kind, MappedValueKind::Geometry { srid: Some(4326) });
        assert!(matches!(
            geometry.literal_to_sql("POINT(1 2)"),
            Err(MappingError::UnsupportedOperation(_))
        ));

        let lanes = mapper.map_property_str("app:Road", "app:lanes").unwrap();
        assert_eq!(lanes.literal_to_sql("2").unwrap(), "2");
        assert!(lanes.literal_to_sql("two").is_err());

        let opened = mapper.map_property_str("app:Road", "app:opened").unwrap();
        assert_eq!(opened.literal_to_sql("1999-12-31").unwrap(), "DATE '1999-12-31'");
    }

    /// Each translation starts from an empty alias space
    #[test]
    fn test_translations_are_independent() {
        let model = model();

        let mut first = PropertyNameMapper::new(&model);
        first.map_property_str("app:Road", "app:operator").unwrap();
        first.map_property_str("app:Road", "app:address/app:city").unwrap();

        let mut second = PropertyNameMapper::new(&model);
        let city = second
            .map_property_str("app:Road", "app:address/app:city")
            .unwrap();
        assert_eq!(city.column_ref(), "citi_3.name");
        assert_eq!(second.joins().len(), 2);
    }

    #[test]
    fn test_multiple_feature_types_in_one_translation() {
        let model = model();
        let mut mapper = PropertyNameMapper::new(&model);

        let road_name = mapper.map_property_str("app:Road", "app:name").unwrap();
        let bridge_road = mapper.map_property_str("app:Bridge", "app:road").unwrap();

        assert_ne!(road_name.table_alias, bridge_road.table_alias);
        assert!(mapper
            .from_clause("app:Bridge")
            .unwrap()
            .starts_with("bridges AS brid_2 LEFT OUTER JOIN roads AS road_3"));
        assert_eq!(mapper.from_clause("app:Road").unwrap(), "roads AS road_1");
    }

    /// The model is shared read-only by parallel translations
    #[test]
    fn test_parallel_translations_share_model() {
        let model = Arc::new(model());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let model = Arc::clone(&model);
                thread::spawn(move || {
                    let mut mapper = PropertyNameMapper::new(&model);
                    mapper
                        .map_property_str("app:Road", "app:address/app:street")
                        .unwrap()
                        .column_ref()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "addr_2.street");
        }
    }
}
