use std::io::Cursor;

use crate::cursor::{Case, Landing, ScanCursor};
use crate::error::{ScanError, SectionContext};
use crate::ir::{CompositeSensitivity, CompositeSensitivityRow, ObservationGroupSensitivity};
use crate::sen::SensitivityLogExtractor;
use crate::table::ColumnSpec;

fn cursor(text: &str) -> ScanCursor<Cursor<Vec<u8>>> {
    ScanCursor::from_reader(Cursor::new(text.as_bytes().to_vec())).unwrap()
}

#[test]
fn test_section_context_keeps_innermost() {
    let inner: crate::Result<()> = Err(ScanError::Configuration("bad".into()));
    let err = inner.in_section("table").in_section("record").unwrap_err();
    match &err {
        ScanError::InSection { section, .. } => assert_eq!(*section, "table"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(err.root(), ScanError::Configuration(_)));
    assert_eq!(err.to_string(), "in table");
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("invalid cursor request: bad"));
}

#[test]
fn test_table_after_phrase_lands_on_next_section() {
    let text = "\
Parameters ----->
 a   1.0
 b   2.0D+00
Next section
";
    let mut cur = cursor(text);
    cur.find_phrase("parameters", Landing::AfterLine, Case::Insensitive)
        .unwrap();
    let spec = ColumnSpec::new(["name", "value"]).index(0);
    let table = cur.read_table(Some(2), &spec, true).unwrap();
    assert_eq!(table.index().unwrap(), vec!["a", "b"]);
    assert_eq!(table.numeric_column("value").unwrap(), vec![1.0, 2.0]);
    assert_eq!(table.end_offset, cur.offset());
    assert_eq!(cur.read_clean_line().unwrap(), "Next section");
}

#[test]
fn test_sensitivity_table_with_unknown_parameter() {
    let text = "\
 OPTIMISATION ITERATION NO.        1 ----->
 Parameter name   Group        Current value           Sensitivity
 k1               hk           1.00000                 0.250000

 OPTIMISATION ITERATION NO.        2 ----->
 Parameter name   Group        Current value           Sensitivity
 k9               hk           1.50000                 0.300000
";
    let err = SensitivityLogExtractor::new(cursor(text))
        .extract()
        .unwrap_err();
    match err.root() {
        ScanError::UnknownParameter { name, .. } => assert_eq!(name, "k9"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_first_sensitivity_table_without_rows() {
    let text = "\
 OPTIMISATION ITERATION NO.        1 ----->
 Parameter name   Group        Current value           Sensitivity

 Composite sensitivities for all observations/prior info ----->
 Sensitivities calculated using all observations:-
 Parameter name   Group        Current value           Sensitivity
 k1               hk           1.50000                 0.300000
";
    let err = SensitivityLogExtractor::new(cursor(text))
        .extract()
        .unwrap_err();
    match &err {
        ScanError::InSection { section, .. } => assert_eq!(*section, "parameter sensitivities"),
        other => panic!("unexpected: {other:?}"),
    }
    let header_len = text.find("\n\n").unwrap() as u64 + 1;
    assert!(matches!(err.root(), ScanError::EmptyTable { offset } if *offset == header_len));
}

#[test]
fn test_empty_sensitivity_file() {
    let history = SensitivityLogExtractor::new(cursor("")).extract().unwrap();
    assert_eq!(history.iteration_count(), 0);
    assert!(history.observation_groups.is_empty());
}

#[test]
fn test_composite_serializes_with_status_tag() {
    let groups = vec![
        ObservationGroupSensitivity {
            group: "head".into(),
            sensitivity: CompositeSensitivity::Present(vec![CompositeSensitivityRow {
                parameter: "k1".into(),
                group: "hk".into(),
                value: 1.5,
                sensitivity: 0.25,
            }]),
        },
        ObservationGroupSensitivity {
            group: "flow".into(),
            sensitivity: CompositeSensitivity::NoContribution,
        },
    ];
    let json = serde_json::to_value(&groups).unwrap();
    assert_eq!(json[0]["sensitivity"]["status"], "Present");
    assert_eq!(json[0]["sensitivity"]["rows"][0]["parameter"], "k1");
    assert_eq!(json[1]["sensitivity"]["status"], "NoContribution");
    assert!(json[1]["sensitivity"].get("rows").is_none());
}
