use crate::error::IngestError;
use crate::models::{DocumentFragment, ExtractionMethod};
use crate::traits::VisionOcr;
use lopdf::Document;
use std::time::Duration;

/// Transcription instruction sent to the vision model for each page.
pub const OCR_INSTRUCTION: &str = "Você é um especialista em OCR. Extraia todo o texto visível \
desta página de documento de forma precisa, mantendo a estrutura original.";

/// Policy knobs for the vision fallback.
#[derive(Debug, Clone, Copy)]
pub struct OcrOptions {
    /// Pause between per-page model calls. Rate limiting, not a tuning knob.
    pub page_delay: Duration,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(2),
        }
    }
}

pub trait PdfExtractor {
    /// Reads the embedded text layer of every page, keeping only pages with
    /// non-blank text. An empty result is not an error; it is the signal to
    /// try the vision fallback.
    fn extract_pages(
        &self,
        bytes: &[u8],
        display_name: &str,
    ) -> Result<Vec<DocumentFragment>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(
        &self,
        bytes: &[u8],
        display_name: &str,
    ) -> Result<Vec<DocumentFragment>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        Ok(text_layer_fragments(&document, display_name))
    }
}

fn text_layer_fragments(document: &Document, display_name: &str) -> Vec<DocumentFragment> {
    let mut fragments = Vec::new();

    for (page_no, _page_id) in document.get_pages() {
        // Pages whose text layer cannot be decoded count as empty; the
        // caller decides whether the whole file goes through the fallback.
        let text = document.extract_text(&[page_no]).unwrap_or_default();

        if !text.trim().is_empty() {
            fragments.push(DocumentFragment::new(
                display_name,
                page_no.saturating_sub(1),
                ExtractionMethod::Direct,
                text,
            ));
        }
    }

    fragments
}

/// Extracts one fragment per readable page of a single PDF.
///
/// The text layer is tried first. Only when it yields zero fragments does
/// the vision fallback transcribe the document page by page, skipping pages
/// with blank replies and sleeping [`OcrOptions::page_delay`] between calls.
pub async fn extract_fragments(
    bytes: &[u8],
    display_name: &str,
    ocr: &dyn VisionOcr,
    options: OcrOptions,
) -> Result<Vec<DocumentFragment>, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let direct = text_layer_fragments(&document, display_name);
    if !direct.is_empty() {
        return Ok(direct);
    }

    let page_count = document.get_pages().len() as u32;
    let mut fragments = Vec::new();

    for page in 0..page_count {
        let reply = ocr.transcribe_page(bytes, page, OCR_INSTRUCTION).await?;
        let transcription = reply.trim();

        if !transcription.is_empty() {
            fragments.push(DocumentFragment::new(
                display_name,
                page,
                ExtractionMethod::VisionOcr,
                transcription,
            ));
        }

        if page + 1 < page_count && !options.page_delay.is_zero() {
            tokio::time::sleep(options.page_delay).await;
        }
    }

    Ok(fragments)
}

#[cfg(test)]
pub(crate) mod test_pdfs {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Builds a minimal single-font PDF with one page per entry in `pages`.
    /// An empty string produces a page without any text operators.
    pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("ET", vec![]),
                ]
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };

            let content = Content { operations };
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

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf serializes");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::test_pdfs::pdf_with_pages;
    use super::{extract_fragments, OcrOptions};
    use crate::error::ServiceError;
    use crate::models::ExtractionMethod;
    use crate::traits::VisionOcr;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingOcr {
        replies: Vec<String>,
        calls: Mutex<Vec<u32>>,
    }

    impl RecordingOcr {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(|reply| reply.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionOcr for RecordingOcr {
        async fn transcribe_page(
            &self,
            _pdf_bytes: &[u8],
            page: u32,
            _instruction: &str,
        ) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push(page);
            self.replies
                .get(page as usize)
                .cloned()
                .ok_or_else(|| ServiceError::EmptyReply(format!("page {page}")))
        }
    }

    fn zero_delay() -> OcrOptions {
        OcrOptions {
            page_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn text_layer_pdf_never_reaches_the_vision_fallback() {
        let bytes = pdf_with_pages(&["Loan amount: 10,000", "Term: 12 months"]);
        let ocr = RecordingOcr::new(&[]);

        let fragments = extract_fragments(&bytes, "A.pdf", &ocr, zero_delay())
            .await
            .expect("extraction succeeds");

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].page, 0);
        assert_eq!(fragments[0].method, ExtractionMethod::Direct);
        assert!(fragments[0].text.contains("Loan amount"));
        assert!(ocr.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn textless_pdf_falls_back_and_keeps_only_nonblank_pages() {
        let bytes = pdf_with_pages(&["", "", ""]);
        let ocr = RecordingOcr::new(&["First page text", "   ", "Third page text"]);

        let fragments = extract_fragments(&bytes, "scan.pdf", &ocr, zero_delay())
            .await
            .expect("fallback succeeds");

        assert_eq!(ocr.calls.lock().unwrap().as_slice(), &[0, 1, 2]);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].page, 0);
        assert_eq!(fragments[0].method, ExtractionMethod::VisionOcr);
        assert_eq!(fragments[1].page, 2);
        assert_eq!(fragments[1].text, "Third page text");
    }

    #[tokio::test]
    async fn unreadable_bytes_are_a_parse_error() {
        let ocr = RecordingOcr::new(&[]);
        let result = extract_fragments(b"%PDF-1.4\n%broken", "bad.pdf", &ocr, zero_delay()).await;

        assert!(matches!(result, Err(crate::IngestError::PdfParse(_))));
    }
}
