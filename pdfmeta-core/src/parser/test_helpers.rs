//! Helper functions for creating valid test PDFs with correct offsets

/// A generated file and the byte offset of each object, in the order given
pub struct PdfFixture {
    pub bytes: Vec<u8>,
    pub offsets: Vec<u64>,
}

/// A PDF 1.4 file with a classic xref table and `/Root 1 0 R`.
pub fn classic_pdf(objects: &[(u32, &str)]) -> PdfFixture {
    classic_pdf_with_trailer(objects, "/Root 1 0 R")
}

/// Like [`classic_pdf`], with `trailer_entries` spliced into the trailer dictionary.
pub fn classic_pdf_with_trailer(objects: &[(u32, &str)], trailer_entries: &str) -> PdfFixture {
    let mut bytes = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());

    for (number, body) in objects {
        offsets.push(bytes.len() as u64);
        bytes.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    let size = objects.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let xref_offset = bytes.len();
    let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
    for number in 1..size {
        match objects.iter().position(|(n, _)| *n == number) {
            Some(i) => xref.push_str(&format!("{:010} 00000 n \n", offsets[i])),
            None => xref.push_str("0000000000 00000 f \n"),
        }
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {size} {trailer_entries} >>\nstartxref\n{xref_offset}\n%%EOF\n"
    ));
    bytes.extend_from_slice(xref.as_bytes());

    PdfFixture { bytes, offsets }
}

/// Catalog, page tree with `pages` leaves, and an Info dictionary as object 3.
pub fn simple_document(pages: usize, info: &str) -> Vec<u8> {
    let first_page = 4;
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", first_page + i)).collect();
    let pages_dict = format!("<< /Type /Pages /Kids [{}] /Count {pages} >>", kids.join(" "));
    let page_bodies: Vec<(u32, String)> = (0..pages)
        .map(|i| (first_page as u32 + i as u32, "<< /Type /Page /Parent 2 0 R >>".to_string()))
        .collect();

    let mut objects: Vec<(u32, &str)> = vec![
        (1, "<< /Type /Catalog /Pages 2 0 R >>"),
        (2, &pages_dict),
        (3, info),
    ];
    objects.extend(page_bodies.iter().map(|(n, body)| (*n, body.as_str())));
    classic_pdf_with_trailer(&objects, "/Root 1 0 R /Info 3 0 R").bytes
}
