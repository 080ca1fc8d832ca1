//! Page rasterization for documents without a text layer
//!
//! Rendering needs the PDFium shared library, which may be missing on the
//! host. [`PdfiumRenderer::probe`] checks for it once at startup; callers
//! hold the result as an optional [`PageRenderer`].

use crate::error::{Error, Result};
use pdfium_render::prelude::*;

/// Upper bound for the render scale
pub const MAX_RENDER_SCALE: f32 = 1.5;

/// File size (KB) at which the render scale starts dropping below the cap
const SCALE_REFERENCE_KB: f32 = 375.0;

/// Rasterizes a single page to PNG
pub trait PageRenderer: Send + Sync {
    /// Render 1-indexed `page` of `data` at `scale`, returning PNG bytes
    fn render_page_png(&self, data: &[u8], page: u32, scale: f32) -> Result<Vec<u8>>;
}

/// Render scale for a document of `file_size_kb` kilobytes.
///
/// `min(1.5, sqrt(375 / size))`, so larger documents render smaller.
pub fn fallback_scale(file_size_kb: f64) -> f32 {
    if file_size_kb <= 0.0 {
        return MAX_RENDER_SCALE;
    }
    let scale = (SCALE_REFERENCE_KB as f64 / file_size_kb).sqrt() as f32;
    scale.min(MAX_RENDER_SCALE)
}

/// Bind PDFium (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::CapabilityUnavailable {
            capability: format!("PDFium rendering ({})", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// [`PageRenderer`] backed by PDFium
#[derive(Debug)]
pub struct PdfiumRenderer {
    _private: (),
}

impl PdfiumRenderer {
    /// Check that PDFium can be bound on this host
    pub fn probe() -> Result<Self> {
        create_pdfium()?;
        Ok(Self { _private: () })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page_png(&self, data: &[u8], page: u32, scale: f32) -> Result<Vec<u8>> {
        let pdfium = create_pdfium()?;

        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| match e {
                PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                    Error::PasswordRequired
                }
                _ => Error::Render {
                    reason: e.to_string(),
                },
            })?;

        let pages = document.pages();
        if page < 1 || page > pages.len() as u32 {
            return Err(Error::Render {
                reason: format!("page {} out of range (1-{})", page, pages.len()),
            });
        }

        let pdf_page = pages.get((page - 1) as u16).map_err(|e| Error::Render {
            reason: format!("Failed to get page {}: {}", page, e),
        })?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| Error::Render {
                reason: format!("page {}: {}", page, e),
            })?;

        let mut png_bytes = Vec::new();
        bitmap
            .as_image()
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .map_err(|e| Error::Render {
                reason: format!("Failed to encode page {} as PNG: {}", page, e),
            })?;

        Ok(png_bytes)
    }
}
