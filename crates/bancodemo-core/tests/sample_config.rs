use std::path::PathBuf;

use bancodemo_core::{RunConfig, SchemaRegistry, StorageKind, StorageTarget};

fn workspace_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").join(relative)
}

#[test]
fn shipped_sample_config_is_valid() {
    let config = RunConfig::load(&workspace_path("configs/bancodemo.toml")).expect("load sample");
    assert!(!config.file_only);
    assert_eq!(config.database, "bancodemo");
    assert_eq!(config.storage.kind, StorageKind::S3);
    assert_eq!(
        config.target(),
        StorageTarget::Catalog {
            database: "bancodemo".to_string()
        }
    );

    let names: Vec<&str> = config.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["clientes", "transacoes_cartao"]);
    assert!(config.tables[1].partitioned);
}

#[test]
fn shipped_schemas_cover_every_sample_table() {
    let config = RunConfig::load(&workspace_path("configs/bancodemo.toml")).expect("load sample");
    let registry = SchemaRegistry::new(workspace_path("schemas"));
    for spec in &config.tables {
        let schema = registry.schema_for(&spec.name).expect("schema present");
        assert_eq!(schema.name, spec.name);
        assert!(
            schema.column_names().contains(&"id_usuario".to_string()),
            "every demo table carries the customer key"
        );
    }
}
