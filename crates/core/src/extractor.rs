use crate::error::ExtractionError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError>;

    /// Concatenates the text of every page in page order.
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let pages = self.extract_pages(path)?;
        Ok(concat_pages(&pages))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        if !path.is_file() {
            return Err(ExtractionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )));
        }

        let document =
            Document::load(path).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for page_no in document.get_pages().into_keys() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(ExtractionError::EmptyDocument(path.display().to_string()));
        }

        Ok(pages)
    }
}

pub fn concat_pages(pages: &[PageText]) -> String {
    let mut ordered = pages.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|page| page.number);
    ordered.into_iter().map(|page| page.text.as_str()).collect()
}

pub fn extract_document_text(path: &Path) -> Result<String, ExtractionError> {
    LopdfExtractor.extract_text(path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::fs;
    use tempfile::tempdir;

    /// Writes a minimal PDF with one page per entry of `page_lines`.
    pub(crate) fn write_text_pdf(path: &Path, page_lines: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in page_lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content encodes"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("pdf is written");
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let pages = vec![
            PageText {
                number: 2,
                text: "second\n".to_string(),
            },
            PageText {
                number: 1,
                text: "first\n".to_string(),
            },
        ];

        assert_eq!(concat_pages(&pages), "first\nsecond\n");
    }

    #[test]
    fn extracts_text_from_generated_pdf() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.pdf");
        write_text_pdf(&path, &["Chapter 1 opens here", "Chapter 2 follows"]);

        let text = extract_document_text(&path)?;

        let first = text.find("Chapter 1").expect("first page text");
        let second = text.find("Chapter 2").expect("second page text");
        assert!(first < second);
        Ok(())
    }

    #[test]
    fn malformed_pdf_is_an_extraction_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_document_text(&path);
        assert!(matches!(result, Err(ExtractionError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = extract_document_text(Path::new("/definitely/not/here.pdf"));
        assert!(matches!(result, Err(ExtractionError::Io(_))));
    }
}
