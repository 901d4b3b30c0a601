use crate::error::{BotError, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// One reference glyph, decoded to an RGBA8 buffer at load time. The letter
/// is taken from the file stem so the template directory doubles as the
/// alphabet definition.
#[derive(Debug, Clone)]
pub struct LetterTemplate {
    pub letter: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LetterMatch {
    x: u32,
    y: u32,
    letter: String,
}

fn collect_png_paths(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_png_paths(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "png") {
            out.push(path);
        }
    }
    Ok(())
}

/// Loads every `.png` under `dir` (recursively, sorted by path) as a letter
/// template. Path order matters: it is the tie-break for overlapping match
/// candidates in [`match_letters`].
pub fn load_templates(dir: &Path) -> Result<Vec<LetterTemplate>> {
    if !dir.is_dir() {
        return Err(BotError::Solver(format!(
            "template directory not found: {}",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    collect_png_paths(dir, &mut paths)?;
    paths.sort();

    if paths.is_empty() {
        return Err(BotError::Solver(format!(
            "no letter templates in {}",
            dir.display()
        )));
    }

    let mut templates = Vec::with_capacity(paths.len());
    for path in &paths {
        let img = image::open(path)?.to_rgba8();
        let letter = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        templates.push(LetterTemplate {
            letter,
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        });
    }

    debug!("Loaded {} letter templates from {}", templates.len(), dir.display());
    Ok(templates)
}

/// Exact sub-image comparison at one offset. A template pixel participates
/// only if its alpha is non-zero; participating pixels must match the
/// captcha RGB byte-for-byte. No distance tolerance.
fn template_matches_at(
    large: &[u8],
    large_w: u32,
    template: &LetterTemplate,
    start_x: u32,
    start_y: u32,
) -> bool {
    for y in 0..template.height {
        for x in 0..template.width {
            let small_idx = ((y * template.width + x) * 4) as usize;
            if template.data[small_idx + 3] == 0 {
                continue;
            }
            let large_idx = (((start_y + y) * large_w + (start_x + x)) * 4) as usize;
            if template.data[small_idx] != large[large_idx]
                || template.data[small_idx + 1] != large[large_idx + 1]
                || template.data[small_idx + 2] != large[large_idx + 2]
            {
                return false;
            }
        }
    }
    true
}

/// Finds every glyph occurrence in an RGBA8 captcha image and returns the
/// letters ordered left to right.
///
/// Exhaustive sliding-window search per template. A candidate is dropped if
/// its bounding box falls within (template width, template height) of an
/// already-accepted match, so the first-iterated template wins overlapping
/// positions. Regions no template matches contribute nothing; the result may
/// be shorter than the true answer.
pub fn match_letters(
    large: &[u8],
    large_w: u32,
    large_h: u32,
    templates: &[LetterTemplate],
) -> String {
    let mut matches: Vec<LetterMatch> = Vec::new();

    for template in templates {
        if template.width > large_w || template.height > large_h {
            continue;
        }
        for y in 0..=(large_h - template.height) {
            for x in 0..=(large_w - template.width) {
                if !template_matches_at(large, large_w, template, x, y) {
                    continue;
                }
                let overlaps = matches.iter().any(|m| {
                    m.x.abs_diff(x) < template.width && m.y.abs_diff(y) < template.height
                });
                if !overlaps {
                    matches.push(LetterMatch {
                        x,
                        y,
                        letter: template.letter.clone(),
                    });
                }
            }
        }
    }

    matches.sort_by_key(|m| m.x);
    matches.into_iter().map(|m| m.letter).collect()
}

/// Template-matching captcha solver. Loads the glyph alphabet once and is
/// read-only afterwards, so one instance can be shared across engines.
pub struct TemplateSolver {
    templates: Vec<LetterTemplate>,
    http: reqwest::Client,
}

impl TemplateSolver {
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            templates: load_templates(dir)?,
            http: reqwest::Client::new(),
        })
    }

    /// Non-suspending variant: match pre-fetched image bytes. The async
    /// [`crate::client::CaptchaSolver::solve`] path funnels into this, so
    /// both variants produce identical output for the same image.
    pub fn solve_bytes(&self, bytes: &[u8]) -> Result<String> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        let answer = match_letters(img.as_raw(), width, height, &self.templates);
        if answer.is_empty() {
            return Err(BotError::Solver("no template matched the captcha".to_string()));
        }
        info!("🔐 Captcha solved: {answer}");
        Ok(answer)
    }

    pub async fn fetch_and_solve(&self, image_url: &str) -> Result<String> {
        let response = self.http.get(image_url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        self.solve_bytes(&bytes)
    }
}
