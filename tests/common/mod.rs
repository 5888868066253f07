//! Fixture builders: every test PDF is assembled byte-exactly in memory,
//! with xref offsets computed rather than hard-coded.
#![allow(dead_code)] // each test binary uses its own subset of builders

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

/// Assemble a classic-table PDF from contiguously numbered object bodies
/// (1..=N). Object 1 is the catalog.
pub fn classic_pdf(bodies: &[&str]) -> Vec<u8> {
    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_at = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", bodies.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!("trailer\n<< /Size {} /Root 1 0 R >>\n", bodies.len() + 1).as_bytes(),
    );
    pdf.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());
    pdf
}

/// The S1 form: three empty text fields named FirstName, LastName, DOB.
pub fn form_pdf() -> Vec<u8> {
    classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>",
        "<< /Type /Pages /Kids [4 0 R] /Count 1 >>",
        "<< /Fields [5 0 R 6 0 R 7 0 R] >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R 6 0 R 7 0 R] >>",
        "<< /FT /Tx /T (FirstName) /V () /Type /Annot /Subtype /Widget /Rect [100 700 300 720] /P 4 0 R >>",
        "<< /FT /Tx /T (LastName) /V () /Type /Annot /Subtype /Widget /Rect [100 670 300 690] /P 4 0 R >>",
        "<< /FT /Tx /T (DOB) /V () /Type /Annot /Subtype /Widget /Rect [100 640 300 660] /P 4 0 R >>",
    ])
}

/// A one-page document with no AcroForm at all.
pub fn plain_pdf() -> Vec<u8> {
    classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
    ])
}

/// Hierarchical form: a parent field `Person` with two child text fields
/// `First` and `Last`.
pub fn hierarchical_form_pdf() -> Vec<u8> {
    classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>",
        "<< /Type /Pages /Kids [4 0 R] /Count 1 >>",
        "<< /Fields [5 0 R] >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [6 0 R 7 0 R] >>",
        "<< /T (Person) /Kids [6 0 R 7 0 R] >>",
        "<< /FT /Tx /T (First) /V (a) /Parent 5 0 R /Type /Annot /Subtype /Widget /Rect [0 0 10 10] /P 4 0 R >>",
        "<< /FT /Tx /T (Last) /V (b) /Parent 5 0 R /Type /Annot /Subtype /Widget /Rect [0 20 10 30] /P 4 0 R >>",
    ])
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn xref_row(kind: u8, f1: u64, f2: u64) -> [u8; 7] {
    let mut row = [0u8; 7];
    row[0] = kind;
    row[1..5].copy_from_slice(&(f1 as u32).to_be_bytes());
    row[5..7].copy_from_slice(&(f2 as u16).to_be_bytes());
    row
}

/// The same form as [`form_pdf`] but written the modern way: the three
/// field dictionaries packed in an object stream (object 8) and the index
/// carried by a cross-reference stream (object 9).
pub fn xref_stream_form_pdf() -> Vec<u8> {
    let direct = [
        "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>",
        "<< /Type /Pages /Kids [4 0 R] /Count 1 >>",
        "<< /Fields [5 0 R 6 0 R 7 0 R] >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R 6 0 R 7 0 R] >>",
    ];
    let packed = [
        "<< /FT /Tx /T (FirstName) /V () /Type /Annot /Subtype /Widget /Rect [100 700 300 720] /P 4 0 R >>",
        "<< /FT /Tx /T (LastName) /V () /Type /Annot /Subtype /Widget /Rect [100 670 300 690] /P 4 0 R >>",
        "<< /FT /Tx /T (DOB) /V () /Type /Annot /Subtype /Widget /Rect [100 640 300 660] /P 4 0 R >>",
    ];

    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.5\n");

    let mut offsets = Vec::new();
    for (i, body) in direct.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    // object stream 8 holding objects 5, 6, 7
    let mut header = String::new();
    let mut bodies = Vec::new();
    for (i, body) in packed.iter().enumerate() {
        header.push_str(&format!("{} {} ", 5 + i, bodies.len()));
        bodies.extend_from_slice(body.as_bytes());
    }
    let first = header.len();
    let mut payload = header.into_bytes();
    payload.extend_from_slice(&bodies);
    let compressed = deflate(&payload);

    let objstm_at = pdf.len();
    pdf.extend_from_slice(
        format!(
            "8 0 obj\n<< /Type /ObjStm /N {} /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            packed.len(),
            first,
            compressed.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&compressed);
    pdf.extend_from_slice(b"\nendstream\nendobj\n");

    // xref stream 9 indexing everything
    let xref_at = pdf.len();
    let mut rows = Vec::new();
    rows.extend_from_slice(&xref_row(0, 0, 65535));
    for offset in &offsets {
        rows.extend_from_slice(&xref_row(1, *offset as u64, 0));
    }
    for i in 0..packed.len() as u64 {
        rows.extend_from_slice(&xref_row(2, 8, i));
    }
    rows.extend_from_slice(&xref_row(1, objstm_at as u64, 0));
    rows.extend_from_slice(&xref_row(1, xref_at as u64, 0));
    let compressed_rows = deflate(&rows);

    pdf.extend_from_slice(
        format!(
            "9 0 obj\n<< /Type /XRef /W [1 4 2] /Size 10 /Root 1 0 R /Filter /FlateDecode /Length {} >>\nstream\n",
            compressed_rows.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&compressed_rows);
    pdf.extend_from_slice(b"\nendstream\nendobj\n");
    pdf.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());
    pdf
}

/// Count standalone occurrences of a marker line like `xref` or
/// `trailer` (not substrings such as the `xref` inside `startxref`).
pub fn count_keyword(haystack: &[u8], keyword: &[u8]) -> usize {
    let mut needle = Vec::with_capacity(keyword.len() + 2);
    needle.push(b'\n');
    needle.extend_from_slice(keyword);
    needle.push(b'\n');
    haystack.windows(needle.len()).filter(|w| *w == &needle[..]).count()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
