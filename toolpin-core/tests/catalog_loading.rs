mod common;

use common::{sha256, MemoryDownloader};
use pretty_assertions::assert_eq;
use serde_json::json;

use toolpin_core::catalog::{Bootstrap, CatalogLoader, CatalogSource, SignatureSource};
use toolpin_core::trust::{HashAlgorithm, ToolHash};
use toolpin_core::UpdateError;

const ROOT: &str = "https://repo.example.org/catalog.json";

fn versions_of(catalog: &toolpin_core::catalog::Catalog, name: &str) -> Vec<String> {
    catalog
        .versions(name)
        .unwrap_or_default()
        .iter()
        .map(|v| v.version.clone())
        .collect()
}

#[tokio::test]
async fn test_include_resolution_merges_entries() {
    let included = json!({
        "phars": {
            "psalm": [{"version": "5.0.0", "phar-url": "psalm.phar"}],
            "phpunit": [{"version": "2.0.0", "phar-url": "phpunit-2.phar"}]
        }
    });
    let included_bytes = serde_json::to_vec(&included).unwrap();

    let downloader = MemoryDownloader::new();
    downloader.serve("https://repo.example.org/more/catalog.json", included_bytes.clone());
    downloader.serve_json(
        ROOT,
        &json!({
            "phars": {
                "phpunit": [{"version": "1.0.0", "phar-url": "phpunit-1.phar"}],
                "more": {
                    "url": "more/catalog.json",
                    "checksum": sha256(&included_bytes)
                }
            }
        }),
    );

    let catalog = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap();

    assert_eq!(versions_of(&catalog, "phpunit"), vec!["1.0.0", "2.0.0"]);
    assert_eq!(versions_of(&catalog, "psalm"), vec!["5.0.0"]);
    assert!(!catalog.contains("more"));

    // Relative locations in an include resolve against the including document
    let psalm = &catalog.versions("psalm").unwrap()[0];
    assert_eq!(
        psalm.url.as_deref(),
        Some("https://repo.example.org/psalm.phar")
    );
}

#[tokio::test]
async fn test_explicit_include_kind() {
    let extra = serde_json::to_vec(
        &json!({"phars": {"phpcs": [{"version": "3.7.0", "phar-url": "phpcs.phar"}]}}),
    )
    .unwrap();

    let downloader = MemoryDownloader::new();
    downloader.serve("https://repo.example.org/extra.json", extra.clone());
    downloader.serve_json(
        ROOT,
        &json!({"phars": {"extra": {"kind": "include", "url": "extra.json", "checksum": sha256(&extra)}}}),
    );

    let catalog = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap();
    assert_eq!(versions_of(&catalog, "phpcs"), vec!["3.7.0"]);
}

#[tokio::test]
async fn test_include_without_checksum_is_rejected() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json(
        "https://repo.example.org/inc.json",
        &json!({"phars": {"phpcs": [{"version": "3.7.0", "phar-url": "phpcs.phar"}]}}),
    );

    for include in [
        json!({"url": "inc.json", "checksum": null}),
        json!({"kind": "include", "url": "inc.json"}),
    ] {
        downloader.serve_json(ROOT, &json!({"phars": {"more": include}}));

        let err = CatalogLoader::new(&downloader)
            .load(ROOT, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Load { .. }), "got {err:?}");
    }
}

#[tokio::test]
async fn test_include_with_wrong_checksum_is_load_error() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json("https://repo.example.org/more.json", &json!({"phars": {}}));
    downloader.serve_json(
        ROOT,
        &json!({
            "phars": {
                "more": {
                    "url": "more.json",
                    "checksum": ToolHash::new(HashAlgorithm::Sha256, "deadbeef")
                }
            }
        }),
    );

    let err = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::Load { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_missing_include_is_load_error() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json(
        ROOT,
        &json!({"phars": {"more": {
            "kind": "include",
            "url": "missing.json",
            "checksum": ToolHash::new(HashAlgorithm::Sha256, "00")
        }}}),
    );

    let err = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::Load { .. }));
}

#[tokio::test]
async fn test_bootstrap_lookup() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json(
        ROOT,
        &json!({
            "bootstraps": {
                "phpunit-glue": {"type": "inline", "plugin-version": "1.0.0", "code": "return 1;"}
            },
            "phars": {
                "phpunit": [
                    {"version": "1.0.0", "bootstrap": "phpunit-glue", "signature": {"content": "sig"}},
                    {"version": "1.1.0", "bootstrap": {"type": "file", "plugin-version": "1.0.0", "url": "glue.php"}}
                ]
            }
        }),
    );

    let catalog = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap();
    let versions = catalog.versions("phpunit").unwrap();

    assert!(matches!(
        &versions[0].bootstrap,
        Some(Bootstrap::Inline { code, .. }) if code == "return 1;"
    ));
    assert_eq!(
        versions[0].signature,
        Some(SignatureSource::Inline {
            content: "sig".to_string()
        })
    );
    assert!(matches!(
        &versions[1].bootstrap,
        Some(Bootstrap::Remote { url, .. }) if url == "https://repo.example.org/glue.php"
    ));
}

#[tokio::test]
async fn test_unresolved_bootstrap_is_load_error() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json(
        ROOT,
        &json!({"phars": {"phpunit": [{"version": "1.0.0", "bootstrap": "nowhere"}]}}),
    );

    let err = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap_err();
    match err {
        UpdateError::Load { reason, .. } => {
            assert_eq!(reason, "Bootstrap not in lookup map: nowhere")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_version_list() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json(ROOT, &json!({"phars": {"phpunit": "1.0.0"}}));

    let err = CatalogLoader::new(&downloader)
        .load(ROOT, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid version list"));
}

#[tokio::test]
async fn test_load_all_merges_repositories_in_order() {
    let downloader = MemoryDownloader::new();
    downloader.serve_json(
        "https://a.example.org/catalog.json",
        &json!({"phars": {"phpunit": [{"version": "1.0.0", "phar-url": "a.phar"}]}}),
    );
    downloader.serve_json(
        "https://b.example.org/catalog.json",
        &json!({"phars": {"phpunit": [{"version": "1.0.0", "phar-url": "b.phar"}]}}),
    );

    let sources = vec![
        CatalogSource {
            url: "https://a.example.org/catalog.json".to_string(),
            checksum: None,
        },
        CatalogSource {
            url: "https://b.example.org/catalog.json".to_string(),
            checksum: None,
        },
    ];

    let catalog = CatalogLoader::new(&downloader)
        .load_all(&sources)
        .await
        .unwrap();
    let urls: Vec<_> = catalog
        .versions("phpunit")
        .unwrap()
        .iter()
        .map(|v| v.url.clone().unwrap())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://a.example.org/a.phar".to_string(),
            "https://b.example.org/b.phar".to_string()
        ]
    );
}
