use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use obr_core::config::ObrConfig;
use obr_repository::RepositoryAdmin;

fn resource_xml(name: &str, version: &str) -> String {
    format!(r#"<resource symbolicname="{name}" version="{version}"/>"#)
}

fn write_repo(path: &Path, referrals: &[(&str, Option<u32>)], resources: &[(&str, &str)]) {
    let mut xml = String::from("<repository>");
    for (url, depth) in referrals {
        match depth {
            Some(d) => xml.push_str(&format!(r#"<referral depth="{d}" url="{url}"/>"#)),
            None => xml.push_str(&format!(r#"<referral url="{url}"/>"#)),
        }
    }
    for (name, version) in resources {
        xml.push_str(&resource_xml(name, version));
    }
    xml.push_str("</repository>");
    std::fs::write(path, xml).unwrap();
}

/// Push the file's mtime forward so refreshes see a newer source.
fn touch_later(path: &Path, secs: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

fn config(staleness_secs: u64, depth: u32) -> ObrConfig {
    let mut config = ObrConfig::default();
    config.refresh.staleness_secs = staleness_secs;
    config.refresh.max_referral_depth = depth;
    config
}

fn names(admin: &RepositoryAdmin) -> Vec<String> {
    admin
        .snapshot()
        .resources()
        .iter()
        .map(|r| r.to_string())
        .collect()
}

#[tokio::test]
async fn test_add_and_remove_repositories() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    let b = dir.path().join("b.xml");
    write_repo(&a, &[], &[("org.a", "1.0")]);
    write_repo(&b, &[], &[("org.b", "1.0")]);

    let admin = RepositoryAdmin::new(&config(300, 0)).unwrap();
    assert!(admin.snapshot().resources().is_empty());

    admin.add_repository(a.to_str().unwrap()).await.unwrap();
    admin.add_repository(b.to_str().unwrap()).await.unwrap();
    assert_eq!(names(&admin), ["org.a (1.0.0)", "org.b (1.0.0)"]);

    assert!(admin.remove_repository(a.to_str().unwrap()).await);
    assert!(!admin.remove_repository(a.to_str().unwrap()).await);
    assert_eq!(names(&admin), ["org.b (1.0.0)"]);
}

#[tokio::test]
async fn test_failed_add_leaves_catalog_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    write_repo(&a, &[], &[("org.a", "1.0")]);

    let admin = RepositoryAdmin::new(&config(300, 0)).unwrap();
    admin.add_repository(a.to_str().unwrap()).await.unwrap();
    let before = admin.snapshot();

    let missing = dir.path().join("missing.xml");
    let err = admin.add_repository(missing.to_str().unwrap()).await.unwrap_err();
    assert!(err.is_io());
    assert!(Arc::ptr_eq(&before, &admin.snapshot()));
}

#[tokio::test]
async fn test_lazy_refresh_respects_staleness_window() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    write_repo(&a, &[], &[("org.a", "1.0")]);

    let admin = RepositoryAdmin::new(&config(3600, 0)).unwrap();
    admin.add_repository(a.to_str().unwrap()).await.unwrap();
    let before = admin.snapshot();

    write_repo(&a, &[], &[("org.a", "2.0")]);
    touch_later(&a, 60);
    let summary = admin.refresh_all().await;
    assert_eq!(summary.unchanged.len(), 1);
    assert!(summary.reloaded.is_empty());
    assert!(Arc::ptr_eq(&before, &admin.snapshot()));
    assert_eq!(names(&admin), ["org.a (1.0.0)"]);

    let summary = admin.reload().await;
    assert_eq!(summary.reloaded.len(), 1);
    assert_eq!(names(&admin), ["org.a (2.0.0)"]);
}

#[tokio::test]
async fn test_stale_source_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    write_repo(&a, &[], &[("org.a", "1.0")]);

    let admin = RepositoryAdmin::new(&config(5, 0)).unwrap();
    admin.add_repository(a.to_str().unwrap()).await.unwrap();
    let before = admin.snapshot();

    write_repo(&a, &[], &[("org.a", "2.0")]);
    touch_later(&a, 120);
    let summary = admin.refresh_all().await;
    assert_eq!(summary.reloaded.len(), 1);
    assert_eq!(names(&admin), ["org.a (2.0.0)"]);
    // readers holding the old snapshot still see it
    assert_eq!(before.resources()[0].to_string(), "org.a (1.0.0)");
}

#[tokio::test]
async fn test_unreachable_source_keeps_cached_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    write_repo(&a, &[], &[("org.a", "1.0")]);

    let admin = RepositoryAdmin::new(&config(0, 0)).unwrap();
    admin.add_repository(a.to_str().unwrap()).await.unwrap();
    std::fs::remove_file(&a).unwrap();

    let summary = admin.reload().await;
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].1.is_io());
    assert_eq!(names(&admin), ["org.a (1.0.0)"]);
}

#[tokio::test]
async fn test_referrals_follow_depth_limits() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.xml");
    write_repo(&root, &[("one.xml", None)], &[("org.root", "1.0")]);
    write_repo(
        &dir.path().join("one.xml"),
        &[("two.xml", Some(5)), ("root.xml", None)],
        &[("org.one", "1.0")],
    );
    write_repo(
        &dir.path().join("two.xml"),
        &[("three.xml", None)],
        &[("org.two", "1.0")],
    );
    write_repo(&dir.path().join("three.xml"), &[], &[("org.three", "1.0")]);

    let deep = RepositoryAdmin::new(&config(300, 2)).unwrap();
    deep.add_repository(root.to_str().unwrap()).await.unwrap();
    assert_eq!(
        names(&deep),
        ["org.root (1.0.0)", "org.one (1.0.0)", "org.two (1.0.0)"]
    );

    let shallow = RepositoryAdmin::new(&config(300, 0)).unwrap();
    shallow.add_repository(root.to_str().unwrap()).await.unwrap();
    assert_eq!(names(&shallow), ["org.root (1.0.0)"]);
}

#[tokio::test]
async fn test_referral_depth_attribute_caps_hops() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.xml");
    write_repo(&root, &[("one.xml", Some(0))], &[("org.root", "1.0")]);
    write_repo(
        &dir.path().join("one.xml"),
        &[("two.xml", None)],
        &[("org.one", "1.0")],
    );
    write_repo(&dir.path().join("two.xml"), &[], &[("org.two", "1.0")]);

    let admin = RepositoryAdmin::new(&config(300, 4)).unwrap();
    admin.add_repository(root.to_str().unwrap()).await.unwrap();
    assert_eq!(names(&admin), ["org.root (1.0.0)", "org.one (1.0.0)"]);
}

#[tokio::test]
async fn test_broken_referral_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.xml");
    write_repo(&root, &[("nowhere.xml", None)], &[("org.root", "1.0")]);

    let admin = RepositoryAdmin::new(&config(300, 3)).unwrap();
    admin.add_repository(root.to_str().unwrap()).await.unwrap();
    assert_eq!(names(&admin), ["org.root (1.0.0)"]);
}

#[tokio::test]
async fn test_from_config_registers_repositories() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    write_repo(&a, &[], &[("org.a", "1.0")]);

    let mut cfg = config(300, 0);
    cfg.repositories = vec![url::Url::from_file_path(&a).unwrap().to_string()];
    let admin = RepositoryAdmin::from_config(&cfg).await.unwrap();
    assert_eq!(names(&admin), ["org.a (1.0.0)"]);
    assert_eq!(admin.snapshot().repositories().len(), 1);
}

#[tokio::test]
async fn test_catalog_keeps_resources_without_identity() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("index.json");
    std::fs::write(
        &json,
        r#"{"resources": [
            {"capabilities": [{"namespace": "osgi.wiring.package", "attributes": {"osgi.wiring.package": "a"}}]},
            {"capabilities": [{"namespace": "osgi.wiring.package", "attributes": {"osgi.wiring.package": "b"}}]}
        ]}"#,
    )
    .unwrap();
    let xml = dir.path().join("named.xml");
    write_repo(&xml, &[], &[("org.a", "1.0")]);

    let admin = RepositoryAdmin::new(&config(300, 0)).unwrap();
    admin.add_repository(json.to_str().unwrap()).await.unwrap();
    admin.add_repository(xml.to_str().unwrap()).await.unwrap();

    let catalog = admin.snapshot();
    assert_eq!(catalog.repositories()[0].resources().len(), 2);
    assert_eq!(catalog.resources().len(), 3);
}
