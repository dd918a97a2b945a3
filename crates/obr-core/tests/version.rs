use obr_core::version::{Version, VersionRange};
use obr_util::errors::ObrError;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

#[test]
fn test_range_boundaries_agree_with_comparison() {
    let floor = v("1.0");
    let ceiling = v("2.0");
    let samples = ["0.9.9", "1.0", "1.0.0.a", "1.5", "2.0", "2.0.0.a", "3"];
    for (text, floor_inc, ceil_inc) in [
        ("[1.0,2.0]", true, true),
        ("[1.0,2.0)", true, false),
        ("(1.0,2.0]", false, true),
        ("(1.0,2.0)", false, false),
    ] {
        let range = VersionRange::parse(text).unwrap();
        for sample in samples {
            let p = v(sample);
            let above = if floor_inc { p >= floor } else { p > floor };
            let below = if ceil_inc { p <= ceiling } else { p < ceiling };
            assert_eq!(range.contains(&p), above && below, "{text} contains {sample}");
        }
    }
}

#[test]
fn test_range_display_round_trips() {
    for text in ["[1.0.0,2.0.0)", "(1.0.0,2.0.0]", "1.5.0", "(1.0.0,)"] {
        let range = VersionRange::parse(text).unwrap();
        assert_eq!(range.to_string(), text);
        assert_eq!(VersionRange::parse(&range.to_string()).unwrap(), range);
    }
}

#[test]
fn test_version_syntax_error_carries_input() {
    match Version::parse("1.two").unwrap_err() {
        ObrError::VersionSyntax { input, .. } => assert_eq!(input, "1.two"),
        other => panic!("unexpected: {other}"),
    }
    assert!(matches!(
        VersionRange::parse("[1.0;2.0]").unwrap_err(),
        ObrError::VersionSyntax { .. }
    ));
}

#[test]
fn test_version_sorting() {
    let mut versions = vec![v("2.0"), v("1.0.0.beta"), v("1.10"), v("1.0"), v("1.9.9")];
    versions.sort();
    let rendered: Vec<String> = versions.iter().map(Version::to_string).collect();
    assert_eq!(rendered, ["1.0.0", "1.0.0.beta", "1.9.9", "1.10.0", "2.0.0"]);
}

#[test]
fn test_range_filter_string_parses() {
    let range = VersionRange::parse("(1.0,2.0)").unwrap();
    let filter = obr_core::Filter::parse(&range.to_filter("version")).unwrap();
    let attrs = |ver: &str| {
        let mut a = obr_core::Attributes::new();
        a.insert("version".to_string(), v(ver).into());
        a
    };
    assert!(!filter.matches(&attrs("1.0")));
    assert!(filter.matches(&attrs("1.5")));
    assert!(!filter.matches(&attrs("2.0")));
}
