use std::path::Path;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use tracing::{info, warn};

use crate::config::ChartConfig;
use crate::error::RenderError;
use crate::model::IndicatorSeries;
use crate::render::svg::{self, Canvas};
use crate::render::{ChartLabels, ChartRenderer};

/// Fonts available to chart text, fixed at construction.
#[derive(Clone)]
pub struct ChartFonts {
    db: Arc<fontdb::Database>,
    family: String,
}

impl ChartFonts {
    /// Load `font_path` when it is a usable font file, then the system fonts.
    /// The file's own family is preferred, `fallback` is used otherwise.
    pub fn load(font_path: Option<&str>, fallback: &str) -> Self {
        let mut db = fontdb::Database::new();
        let loaded = font_path.and_then(|path| load_font_file(&mut db, path));
        db.load_system_fonts();
        Self::from_database(db, loaded, fallback)
    }

    fn from_database(db: fontdb::Database, preferred: Option<String>, fallback: &str) -> Self {
        let family = match preferred {
            Some(name) => format!("'{name}', {fallback}"),
            None => fallback.to_owned(),
        };
        Self {
            db: Arc::new(db),
            family,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }
}

/// Family name of the first face in `path`, `None` if nothing was loaded.
fn load_font_file(db: &mut fontdb::Database, path: &str) -> Option<String> {
    let before = db.len();
    if let Err(e) = db.load_font_file(path) {
        warn!(path, error = %e, "chart font file not found, using default font");
        return None;
    }
    let family = db
        .faces()
        .skip(before)
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
    match &family {
        Some(name) => info!(path, family = %name, "chart font loaded"),
        None => warn!(path, "chart font file holds no usable face, using default font"),
    }
    family
}

/// Renders charts as PNG images.
pub struct PngChartRenderer {
    fonts: ChartFonts,
    width: u32,
    height: u32,
}

impl PngChartRenderer {
    pub fn new(config: &ChartConfig) -> Self {
        Self::with_fonts(
            ChartFonts::load(config.font_path.as_deref(), &config.font_family),
            config.width,
            config.height,
        )
    }

    pub fn with_fonts(fonts: ChartFonts, width: u32, height: u32) -> Self {
        Self {
            fonts,
            width,
            height,
        }
    }
}

impl ChartRenderer for PngChartRenderer {
    fn extension(&self) -> &str {
        "png"
    }

    fn render<'a>(
        &'a self,
        series: &'a IndicatorSeries,
        labels: &'a ChartLabels,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), Report<RenderError>>> {
        Box::pin(async move {
            let canvas = Canvas {
                width: self.width,
                height: self.height,
                font_family: self.fonts.family(),
            };
            let document =
                svg::document(series, labels, canvas).change_context(RenderError::Rasterize)?;

            let fonts = self.fonts.clone();
            let png = tokio::task::spawn_blocking(move || rasterize(&document, &fonts))
                .await
                .change_context(RenderError::Rasterize)??;

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .change_context(RenderError::OutputDir)
                    .attach_with(|| {
                        format!("cannot create output directory: {}", parent.display())
                    })?;
            }
            tokio::fs::write(output, &png)
                .await
                .change_context(RenderError::Write)
                .attach_with(|| format!("path: {}", output.display()))?;

            info!(
                indicator = %series.kind,
                path = %output.display(),
                points = series.len(),
                bytes = png.len(),
                "chart rendered"
            );
            Ok(())
        })
    }
}

fn rasterize(document: &str, fonts: &ChartFonts) -> Result<Vec<u8>, Report<RenderError>> {
    let options = usvg::Options {
        fontdb: Arc::clone(&fonts.db),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_str(document, &options).change_context(RenderError::Rasterize)?;

    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height()).ok_or_else(|| {
        Report::new(RenderError::Rasterize)
            .attach(format!("canvas {}x{}", size.width(), size.height()))
    })?;
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    pixmap.encode_png().change_context(RenderError::Rasterize)
}
