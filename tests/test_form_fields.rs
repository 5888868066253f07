//! Integration tests for the field layer: listing, filling, renaming,
//! adding, and removing AcroForm fields.

mod common;

use common::{contains, form_pdf, hierarchical_form_pdf, plain_pdf, xref_stream_form_pdf};
use formpatch::{DocumentEditor, FieldKind, FieldValue, NewField, ObjRef};
use std::collections::HashSet;

fn names(editor: &mut DocumentEditor) -> HashSet<String> {
    editor
        .list_fields()
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect()
}

mod list_tests {
    use super::*;

    #[test]
    fn test_list_known_form() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        let fields = editor.list_fields().unwrap();
        assert_eq!(fields.len(), 3);

        let expected: HashSet<String> =
            ["FirstName", "LastName", "DOB"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&mut editor), expected);

        for field in fields {
            assert_eq!(field.kind, FieldKind::Text);
            assert_eq!(field.value.as_deref(), Some(""));
            assert!(!field.target.is_detached());
        }
    }

    #[test]
    fn test_list_packed_form() {
        let mut editor = DocumentEditor::open(xref_stream_form_pdf()).unwrap();
        assert_eq!(editor.list_fields().unwrap().len(), 3);
        assert!(names(&mut editor).contains("DOB"));
    }

    #[test]
    fn test_list_hierarchical_names() {
        let mut editor = DocumentEditor::open(hierarchical_form_pdf()).unwrap();
        let expected: HashSet<String> =
            ["Person.First", "Person.Last"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&mut editor), expected);
    }

    #[test]
    fn test_list_no_form() {
        let mut editor = DocumentEditor::open(plain_pdf()).unwrap();
        assert!(editor.list_fields().unwrap().is_empty());
    }

    #[test]
    fn test_scan_fallback_finds_unlinked_fields() {
        // a field object exists but nothing references it from an AcroForm
        let pdf = common::classic_pdf(&[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            "<< /FT /Tx /T (Orphan) /V (lost) >>",
        ]);
        let mut editor = DocumentEditor::open(pdf).unwrap();
        let fields = editor.list_fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "Orphan");
        assert_eq!(fields[0].value.as_deref(), Some("lost"));
        // the scan located its real object header
        assert_eq!(fields[0].target, ObjRef::new(4, 0));
    }
}

mod value_tests {
    use super::*;

    #[test]
    fn test_update_and_read_back() {
        let original = form_pdf();
        let mut editor = DocumentEditor::open(original.clone()).unwrap();
        assert!(editor
            .set_field_value("FirstName", &FieldValue::Text("Ada".to_string()))
            .unwrap());
        let out = editor.write_incremental().unwrap();

        // original bytes verbatim up front
        assert_eq!(&out[..original.len()], &original[..]);

        let mut reopened = DocumentEditor::open(out).unwrap();
        assert_eq!(reopened.field_value("FirstName").unwrap().as_deref(), Some("Ada"));
        assert_eq!(reopened.field_value("LastName").unwrap().as_deref(), Some(""));
        assert_eq!(reopened.field_value("DOB").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_update_marks_acroform() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        editor
            .set_field_value("FirstName", &FieldValue::Text("x".to_string()))
            .unwrap();
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let acroform = reopened.read(ObjRef::new(3, 0)).unwrap();
        assert!(contains(&acroform, b"/NeedAppearances true"));
    }

    #[test]
    fn test_xfa_stripped_on_patch() {
        let pdf = common::classic_pdf(&[
            "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>",
            "<< /Type /Pages /Kids [4 0 R] /Count 1 >>",
            "<< /Fields [5 0 R] /XFA [(datasets) 6 0 R] >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R] >>",
            "<< /FT /Tx /T (A) /V () /Type /Annot /Subtype /Widget /Rect [0 0 1 1] /P 4 0 R >>",
            "<< /Length 1 >>\nstream\nx\nendstream",
        ]);
        let mut editor = DocumentEditor::open(pdf).unwrap();
        editor.set_field_value("A", &FieldValue::Text("v".to_string())).unwrap();
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let acroform = reopened.read(ObjRef::new(3, 0)).unwrap();
        assert!(!contains(&acroform, b"/XFA"));
        assert!(contains(&acroform, b"/Fields [5 0 R]"));
    }

    #[test]
    fn test_unicode_value_round_trip() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        editor
            .set_field_value("FirstName", &FieldValue::Text("Ada Löveläce ✓".to_string()))
            .unwrap();
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        assert_eq!(
            reopened.field_value("FirstName").unwrap().as_deref(),
            Some("Ada Löveläce ✓")
        );
    }

    #[test]
    fn test_missing_field_returns_false() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        assert!(!editor
            .set_field_value("NoSuchField", &FieldValue::Text("x".to_string()))
            .unwrap());
        assert_eq!(editor.pending_patches(), 0);
    }

    #[test]
    fn test_checkbox_syncs_appearance_state() {
        let pdf = common::classic_pdf(&[
            "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>",
            "<< /Type /Pages /Kids [4 0 R] /Count 1 >>",
            "<< /Fields [5 0 R] >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R] >>",
            "<< /FT /Btn /T (Agree) /V /Off /AS /Off /Type /Annot /Subtype /Widget /Rect [0 0 10 10] /P 4 0 R >>",
        ]);
        let mut editor = DocumentEditor::open(pdf).unwrap();
        editor.set_field_value("Agree", &FieldValue::Toggle(true)).unwrap();
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let body = reopened.read(ObjRef::new(5, 0)).unwrap();
        assert!(contains(&body, b"/V /Yes"));
        assert!(contains(&body, b"/AS /Yes"));
    }

    #[test]
    fn test_hierarchical_value_update() {
        let mut editor = DocumentEditor::open(hierarchical_form_pdf()).unwrap();
        assert!(editor
            .set_field_value("Person.First", &FieldValue::Text("Grace".to_string()))
            .unwrap());
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        assert_eq!(
            reopened.field_value("Person.First").unwrap().as_deref(),
            Some("Grace")
        );
        assert_eq!(reopened.field_value("Person.Last").unwrap().as_deref(), Some("b"));
    }
}

mod rename_tests {
    use super::*;

    #[test]
    fn test_rename_field() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        assert!(editor.rename_field("DOB", "DateOfBirth").unwrap());
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let got = names(&mut reopened);
        assert!(got.contains("DateOfBirth"));
        assert!(!got.contains("DOB"));
    }

    #[test]
    fn test_rename_missing_returns_false() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        assert!(!editor.rename_field("Nope", "StillNope").unwrap());
        assert_eq!(editor.pending_patches(), 0);
    }
}

mod add_tests {
    use super::*;

    #[test]
    fn test_add_text_field() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        let added = editor
            .add_field(0, NewField::text("Email", [100.0, 600.0, 300.0, 620.0]))
            .unwrap()
            .expect("page 0 exists");
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        assert!(names(&mut reopened).contains("Email"));

        // linked from both the AcroForm and the page
        let acroform = reopened.read(ObjRef::new(3, 0)).unwrap();
        assert!(contains(&acroform, &added.to_token()));
        let page = reopened.read(ObjRef::new(4, 0)).unwrap();
        assert!(contains(&page, &added.to_token()));
    }

    #[test]
    fn test_add_creates_acroform_when_missing() {
        let mut editor = DocumentEditor::open(plain_pdf()).unwrap();
        editor
            .add_field(0, NewField::text("Name", [10.0, 10.0, 60.0, 30.0]))
            .unwrap()
            .expect("page 0 exists");
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        assert!(reopened.acroform_ref().unwrap().is_some());
        assert!(names(&mut reopened).contains("Name"));
    }

    #[test]
    fn test_add_checkbox_choice_signature() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        editor
            .add_field(0, NewField::checkbox("Agree", [10.0, 10.0, 20.0, 20.0]))
            .unwrap()
            .unwrap();
        editor
            .add_field(
                0,
                NewField::choice(
                    "Color",
                    [10.0, 30.0, 110.0, 50.0],
                    vec!["Red".to_string(), "Green".to_string()],
                    true,
                ),
            )
            .unwrap()
            .unwrap();
        editor
            .add_field(0, NewField::signature("Sig", [10.0, 60.0, 210.0, 120.0]))
            .unwrap()
            .unwrap();
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let by_name: std::collections::HashMap<String, FieldKind> = reopened
            .list_fields()
            .unwrap()
            .into_iter()
            .map(|f| (f.name, f.kind))
            .collect();
        assert_eq!(by_name["Agree"], FieldKind::Button);
        assert_eq!(by_name["Color"], FieldKind::Choice);
        assert_eq!(by_name["Sig"], FieldKind::Signature);
    }

    #[test]
    fn test_add_radio_group() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        let group = editor
            .add_field(
                0,
                NewField::radio(
                    "Size",
                    vec![
                        ("Small".to_string(), [10.0, 10.0, 20.0, 20.0]),
                        ("Large".to_string(), [10.0, 30.0, 20.0, 40.0]),
                    ],
                ),
            )
            .unwrap()
            .unwrap();
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let fields = reopened.list_fields().unwrap();
        let size = fields.iter().find(|f| f.name == "Size").expect("group listed");
        assert_eq!(size.kind, FieldKind::Radio);

        let body = reopened.read(group).unwrap();
        assert!(contains(&body, b"/Opt [(Small) (Large)]"));
        // the kid widgets landed on the page
        let kids = reopened.read(group).unwrap();
        assert!(contains(&kids, b"/Kids ["));
    }

    #[test]
    fn test_add_to_bad_page_index() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        assert!(editor
            .add_field(9, NewField::text("X", [0.0, 0.0, 1.0, 1.0]))
            .unwrap()
            .is_none());
    }
}

mod remove_tests {
    use super::*;

    #[test]
    fn test_remove_field() {
        let original = form_pdf();
        let mut editor = DocumentEditor::open(original.clone()).unwrap();
        assert!(editor.remove_field("LastName").unwrap());
        let out = editor.write_incremental().unwrap();

        // incremental removal never touches the original bytes
        assert_eq!(&out[..original.len()], &original[..]);

        let mut reopened = DocumentEditor::open(out).unwrap();
        let got = names(&mut reopened);
        assert!(!got.contains("LastName"));
        assert!(got.contains("FirstName"));

        // detached from the referring arrays
        let acroform = reopened.read(ObjRef::new(3, 0)).unwrap();
        assert!(!contains(&acroform, b"6 0 R"));
        let page = reopened.read(ObjRef::new(4, 0)).unwrap();
        assert!(!contains(&page, b"6 0 R"));
    }

    #[test]
    fn test_remove_missing_returns_false() {
        let mut editor = DocumentEditor::open(form_pdf()).unwrap();
        assert!(!editor.remove_field("Ghost").unwrap());
    }

    #[test]
    fn test_remove_hierarchical_child() {
        let mut editor = DocumentEditor::open(hierarchical_form_pdf()).unwrap();
        assert!(editor.remove_field("Person.First").unwrap());
        let out = editor.write_incremental().unwrap();

        let mut reopened = DocumentEditor::open(out).unwrap();
        let got = names(&mut reopened);
        assert!(!got.contains("Person.First"));
        assert!(got.contains("Person.Last"));

        // dropped from the parent's /Kids
        let parent = reopened.read(ObjRef::new(5, 0)).unwrap();
        assert!(!contains(&parent, b"6 0 R"));
    }
}
