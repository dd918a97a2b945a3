use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use obr_core::config::FetchConfig;
use obr_core::{namespace, Filter, Version};
use obr_repository::{load, write_repository, Fetcher, Format, Repository};
use obr_util::errors::ObrError;

const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repository name="local" lastmodified="20240101120000.000">
  <resource id="1" symbolicname="org.mypackage.impl" presentationname="My Package" uri="bundles/impl.jar" version="1.9.0">
    <description>Provides org.mypackage</description>
    <documentation>docs/index.html</documentation>
    <capability name="osgi.wiring.package">
      <p n="osgi.wiring.package" v="org.mypackage"/>
      <p n="version" t="version" v="1.9.0"/>
    </capability>
    <require name="osgi.wiring.package" filter="(osgi.wiring.package=org.dep)" optional="true">needs org.dep</require>
  </resource>
  <resource id="2" symbolicname="org.dep" uri="https://cdn.example.org/dep.jar" version="2.0.0">
    <capability name="osgi.wiring.package">
      <p n="osgi.wiring.package" v="org.dep"/>
    </capability>
  </resource>
</repository>"#;

const JSON: &str = r#"{
  "name": "json",
  "resources": [
    {"symbolicName": "org.json", "version": "1.0.0",
     "capabilities": [{"namespace": "osgi.wiring.package", "attributes": {"osgi.wiring.package": "org.json"}}]}
  ]
}"#;

fn fetcher() -> Fetcher {
    Fetcher::new(&FetchConfig::default()).unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn zipped(entry: &str, data: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(entry, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[tokio::test]
async fn test_load_plain_xml_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repository.xml");
    std::fs::write(&path, XML).unwrap();

    let repo = load(&fetcher(), path_str(&path)).await.unwrap();
    assert_eq!(repo.name.as_deref(), Some("local"));
    assert_eq!(repo.resources().len(), 2);
    assert!(repo.source_modified.is_some());
    assert!(repo.last_modified.is_some());

    let first = &repo.resources()[0];
    let expected_uri = url::Url::from_file_path(dir.path().join("bundles/impl.jar")).unwrap();
    assert_eq!(first.uri(), Some(expected_uri.as_str()));
    assert!(first.property("documentation").unwrap().ends_with("/docs/index.html"));
    assert_eq!(repo.resources()[1].uri(), Some("https://cdn.example.org/dep.jar"));
}

#[tokio::test]
async fn test_gzip_and_zip_containers_are_sniffed() {
    let dir = tempfile::tempdir().unwrap();
    // names deliberately say nothing about the container
    let gz = dir.path().join("index.bin");
    std::fs::write(&gz, gzip(XML.as_bytes())).unwrap();
    let zp = dir.path().join("index.dat");
    std::fs::write(&zp, zipped("repository.xml", XML.as_bytes())).unwrap();
    let gz_json = dir.path().join("index.json.gz");
    std::fs::write(&gz_json, gzip(JSON.as_bytes())).unwrap();

    let f = fetcher();
    assert_eq!(load(&f, path_str(&gz)).await.unwrap().resources().len(), 2);
    assert_eq!(load(&f, path_str(&zp)).await.unwrap().resources().len(), 2);
    let json = load(&f, path_str(&gz_json)).await.unwrap();
    assert_eq!(json.name.as_deref(), Some("json"));
    assert_eq!(json.resources()[0].version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_zip_without_repository_entry_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repo.zip");
    std::fs::write(&path, zipped("other.xml", XML.as_bytes())).unwrap();
    let err = load(&fetcher(), path_str(&path)).await.unwrap_err();
    assert!(matches!(err, ObrError::RepositoryFormat { .. }), "{err}");
}

#[tokio::test]
async fn test_io_and_format_errors_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.xml");
    let err = load(&fetcher(), path_str(&missing)).await.unwrap_err();
    assert!(err.is_io());

    let garbage = dir.path().join("garbage.xml");
    std::fs::write(&garbage, "not a repository").unwrap();
    let err = load(&fetcher(), path_str(&garbage)).await.unwrap_err();
    assert!(matches!(err, ObrError::RepositoryFormat { .. }));
    assert!(!err.is_io());
}

#[test]
fn test_find_providers_uses_namespace_and_filter() {
    let repo = Repository::from_bytes("https://repo.example.org/r.xml", XML.into(), None).unwrap();
    let filter =
        Filter::parse("(&(osgi.wiring.package=org.mypackage)(version>=1.9.0))").unwrap();
    let providers = repo.find_providers(namespace::PACKAGE, &filter);
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].symbolic_name.as_deref(), Some("org.mypackage.impl"));

    assert!(repo.find_providers(namespace::BUNDLE, &filter).is_empty());
    let too_new = Filter::parse("(&(osgi.wiring.package=org.mypackage)(version>=2.0.0))").unwrap();
    assert!(repo.find_providers(namespace::PACKAGE, &too_new).is_empty());
}

#[test]
fn test_format_hint_overrides_sniffing() {
    let err = Repository::from_bytes("mem:", JSON.into(), Some(Format::Xml)).unwrap_err();
    assert!(matches!(err, ObrError::RepositoryFormat { .. }));
}

#[test]
fn test_written_xml_reads_back() {
    let uri = "https://repo.example.org/obr/repository.xml";
    let original = Repository::from_bytes(uri, XML.into(), None).unwrap();
    let xml = write_repository(&original).unwrap();
    assert!(xml.contains(r#"uri="bundles/impl.jar""#), "{xml}");

    let reread = Repository::from_bytes(uri, xml.into_bytes(), None).unwrap();
    assert_eq!(reread.name, original.name);
    assert_eq!(reread.last_modified, original.last_modified);
    assert_eq!(reread.resources().len(), original.resources().len());
    for (a, b) in original.resources().iter().zip(reread.resources()) {
        assert_eq!(a.as_ref(), b.as_ref());
    }
}
