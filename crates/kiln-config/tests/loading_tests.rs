//! Loading definition and catalog files and running them through the engine.

use kiln_config::{ConfigError, StaticCatalog, load_definitions, parse_definitions};
use kiln_core::ports::CatalogProvider;
use kiln_core::{FilterExpr, PipelineAssembler, PropertyValue, ResourceMatcher, Resolver};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn image_names(report: &kiln_core::MatchReport) -> Vec<&str> {
    report.images.iter().map(|i| i.name.as_str()).collect()
}

fn worker_names(report: &kiln_core::MatchReport) -> Vec<&str> {
    report.workers.iter().map(|w| w.name.as_str()).collect()
}

#[test]
fn test_fixture_loads_and_resolves() {
    let set = load_definitions(&fixture("builders.yaml")).unwrap();
    let names: Vec<&str> = set.names().map(|n| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "cpp-cuda-test",
            "cpp-test",
            "python-cuda-test",
            "python-minimal-test",
            "python-test",
        ]
    );

    let resolved = Resolver::new(&set).resolve_all().unwrap();
    assert_eq!(resolved.len(), 5);
}

#[test]
fn test_cuda_child_narrows_parent() {
    let set = load_definitions(&fixture("builders.yaml")).unwrap();
    let resolved = Resolver::new(&set).resolve("cpp-cuda-test").unwrap();

    assert_eq!(
        resolved.tags,
        vec!["arrow", "cpp", "gandiva", "parquet", "plasma", "cuda"]
    );
    assert_eq!(resolved.properties["ARROW_CUDA"], PropertyValue::literal("ON"));
    assert_eq!(resolved.properties["ARROW_PARQUET"], PropertyValue::literal("ON"));
    assert_eq!(resolved.host_config["runtime"], json!("nvidia"));
    assert_eq!(resolved.worker_filter, Some(FilterExpr::all([FilterExpr::has_tag("cuda")])));
    assert_eq!(
        resolved.image_filter,
        Some(FilterExpr::all([
            FilterExpr::equals("name", "cpp"),
            FilterExpr::equals("tag", "worker"),
            FilterExpr::equals("variant", "cuda"),
            FilterExpr::equals("platform.arch", "amd64"),
            FilterExpr::equals("platform.distro", "ubuntu"),
        ]))
    );

    let catalog = StaticCatalog::from_file(&fixture("catalog.yaml")).unwrap();
    let report = ResourceMatcher::new().evaluate(&resolved, &catalog.snapshot().unwrap());
    assert_eq!(worker_names(&report), vec!["ursa-2"]);
    assert_eq!(image_names(&report), vec!["amd64-ubuntu-18.04-cpp-cuda"]);
}

#[test]
fn test_python_builder_matches_and_assembles() {
    let set = load_definitions(&fixture("builders.yaml")).unwrap();
    let resolved = Resolver::new(&set).resolve("python-test").unwrap();
    assert_eq!(resolved.ancestry.len(), 2);
    assert_eq!(resolved.steps.len(), 8);

    let catalog = StaticCatalog::from_file(&fixture("catalog.yaml")).unwrap();
    let report = ResourceMatcher::new().evaluate(&resolved, &catalog.snapshot().unwrap());
    assert_eq!(worker_names(&report), vec!["ursa-1", "ursa-2", "packet-arm"]);
    assert_eq!(
        image_names(&report),
        vec![
            "amd64-ubuntu-18.04-python-3.7",
            "arm64v8-ubuntu-18.04-python-3.7",
            "amd64-ubuntu-18.04-python-3.7-cuda",
        ]
    );
    assert_eq!(report.pair_count(), 9);

    let (worker, image) = report.first_pair().unwrap();
    let job = PipelineAssembler::new("/build/python-test")
        .assemble(&resolved, (worker, image))
        .unwrap();

    assert_eq!(job.worker, "ursa-1");
    assert_eq!(job.image, "amd64-ubuntu-18.04-python-3.7");
    assert_eq!(job.volumes, vec!["/build/python-test:/root/.ccache:rw"]);

    let cmake = job.step("CMake").unwrap();
    assert_eq!(cmake.workdir, "/build/python-test/cpp/build");
    assert_eq!(
        cmake.args,
        vec!["-GNinja", "-DARROW_CUDA=OFF", "-DCMAKE_INSTALL_PREFIX=/usr/local", ".."]
    );
    assert_eq!(job.step("Compile C++").unwrap().args, vec!["-j", "6"]);

    let test = job.step("Test PyArrow").unwrap();
    assert_eq!(test.index, 7);
    assert_eq!(test.env["LD_LIBRARY_PATH"], "/usr/local/lib");
    assert_eq!(
        test.env["PARQUET_TEST_DATA"],
        "/build/python-test/cpp/submodules/parquet-testing/data"
    );

    let clone = job.step("Clone Arrow").unwrap();
    assert_eq!(clone.extra["repository"], json!("https://github.com/apache/arrow"));
}

#[test]
fn test_python_cuda_merges_host_config() {
    let set = load_definitions(&fixture("builders.yaml")).unwrap();
    let resolved = Resolver::new(&set).resolve("python-cuda-test").unwrap();
    assert_eq!(resolved.host_config["shm_size"], json!("2G"));
    assert_eq!(resolved.host_config["runtime"], json!("nvidia"));

    let catalog = StaticCatalog::from_file(&fixture("catalog.yaml")).unwrap();
    let report = ResourceMatcher::new().evaluate(&resolved, &catalog.snapshot().unwrap());
    assert_eq!(report.pairs().len(), 1);
    assert_eq!(image_names(&report), vec!["amd64-ubuntu-18.04-python-3.7-cuda"]);
}

#[test]
fn test_merge_removals() {
    let set = load_definitions(&fixture("builders.yaml")).unwrap();
    let resolved = Resolver::new(&set).resolve("python-minimal-test").unwrap();
    assert_eq!(resolved.properties["ARROW_GANDIVA"], PropertyValue::literal("OFF"));
    assert!(!resolved.properties.contains_key("ARROW_PLASMA"));
    assert!(resolved.properties.contains_key("ARROW_PYTHON"));
    assert!(resolved.env.is_empty());
}

#[test]
fn test_merging_wildcard_relaxes_nested_block() {
    let set = parse_definitions(
        "builders:\n  cpp:\n    image_filter: {name: cpp, platform: {arch: amd64, distro: ubuntu}}\n  \
         cpp-any:\n    parent: cpp\n    image_filter: !merge {platform: ~}\n",
    )
    .unwrap();
    let resolved = Resolver::new(&set).resolve("cpp-any").unwrap();
    assert_eq!(
        resolved.image_filter,
        Some(FilterExpr::all([
            FilterExpr::equals("name", "cpp"),
            FilterExpr::wildcard("platform"),
        ]))
    );

    let catalog = StaticCatalog::parse(
        "workers: [{name: ursa-1}]\nimages:\n  - name: arm64v8-debian-cpp\n    \
         attributes: {name: cpp, platform: {arch: arm64v8, distro: debian}}\n",
    )
    .unwrap();
    let snapshot = catalog.snapshot().unwrap();
    let matcher = ResourceMatcher::new();
    assert_eq!(matcher.evaluate(&resolved, &snapshot).pair_count(), 1);

    let parent = Resolver::new(&set).resolve("cpp").unwrap();
    assert!(matcher.evaluate(&parent, &snapshot).is_unschedulable());
}

#[test]
fn test_wrong_combinator_fails_at_resolution() {
    let set = parse_definitions(
        "builders:\n  base:\n    env: {A: a}\n  child:\n    parent: base\n    env: !extend {B: b}\n",
    )
    .unwrap();
    let err = Resolver::new(&set).resolve("child").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot resolve attribute 'env' of 'child' (ancestry position 1): extend is not valid for a map attribute"
    );
}

#[test]
fn test_unknown_parent_rejected_at_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "builders:\n  child:\n    parent: missing").unwrap();
    let err = load_definitions(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownParent { .. }));
}

#[test]
fn test_cycle_rejected_at_load() {
    let err = parse_definitions("builders:\n  a: {parent: b}\n  b: {parent: a}\n").unwrap_err();
    assert_eq!(err.to_string(), "Cyclic ancestry among builders: a, b");
}

#[test]
fn test_invalid_glob_rejected_at_load() {
    let parsed = parse_definitions("builders:\n  a:\n    image_filter: {name: !glob 7}\n");
    assert!(parsed.is_ok(), "numbers are valid glob text");

    let err = parse_definitions("builders:\n  a:\n    image_filter: {name: !glob [a]}\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBuilder { ref field, .. } if field == "image_filter"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_definitions(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
