//! Framework Detection
//!
//! Scores every known framework against a file inventory and picks the best
//! match. The score is a weighted sum of three signals:
//!
//! - marker files (`pom.xml` mentioning spring, `package.json` naming express…)
//! - content density: share of sampled source files containing a
//!   characteristic import or annotation string
//! - directory conventions (`src/main/java`, `Controllers`, `routers`…)
//!
//! The sample is the first `sample_limit` source files in path order, and ties
//! break on declaration order, so the outcome never depends on how the file
//! system happened to enumerate entries.

use std::fs;
use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::language::Language;
use crate::domain::source::FileInventory;

pub const MARKER_WEIGHT: f64 = 0.4;
pub const CONTENT_WEIGHT: f64 = 0.4;
pub const DIRECTORY_WEIGHT: f64 = 0.2;
/// The top score must exceed this, otherwise the detector answers `Unknown`
/// instead of guessing. Equal to `DIRECTORY_WEIGHT`: a directory name alone
/// never identifies a framework.
pub const MIN_CONFIDENCE: f64 = 0.2;
/// Bytes read from each sampled file.
const SAMPLE_BYTES: u64 = 64 * 1024;

/// Supported frameworks, in tie-break priority order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Framework {
    Spring,
    Django,
    FastApi,
    Flask,
    Express,
    AspNetCore,
    Actix,
    Axum,
    /// No framework scored above the threshold; generic rules apply.
    #[default]
    Unknown,
}

/// A characteristic file, optionally required to contain a token.
#[derive(Debug, Clone, Copy)]
pub struct MarkerFile {
    pub suffix: &'static str,
    pub contains: Option<&'static str>,
}

const fn marker(suffix: &'static str, contains: Option<&'static str>) -> MarkerFile {
    MarkerFile { suffix, contains }
}

/// Detection signals for one framework.
#[derive(Debug, Clone, Copy)]
pub struct Signals {
    pub markers: &'static [MarkerFile],
    pub content: &'static [&'static str],
    pub directories: &'static [&'static str],
}

impl Framework {
    pub const KNOWN: [Framework; 8] = [
        Framework::Spring,
        Framework::Django,
        Framework::FastApi,
        Framework::Flask,
        Framework::Express,
        Framework::AspNetCore,
        Framework::Actix,
        Framework::Axum,
    ];

    pub fn from_name(s: &str) -> Option<Framework> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "spring" | "springboot" => Some(Framework::Spring),
            "django" | "djangorestframework" => Some(Framework::Django),
            "fastapi" => Some(Framework::FastApi),
            "flask" => Some(Framework::Flask),
            "express" | "expressjs" => Some(Framework::Express),
            "aspnet" | "aspnetcore" | "dotnet" => Some(Framework::AspNetCore),
            "actix" | "actixweb" => Some(Framework::Actix),
            "axum" => Some(Framework::Axum),
            "unknown" | "generic" => Some(Framework::Unknown),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Framework::Spring => "spring",
            Framework::Django => "django",
            Framework::FastApi => "fastapi",
            Framework::Flask => "flask",
            Framework::Express => "express",
            Framework::AspNetCore => "aspnet-core",
            Framework::Actix => "actix",
            Framework::Axum => "axum",
            Framework::Unknown => "unknown",
        }
    }

    /// Languages the framework's rule tables cover.
    pub fn languages(&self) -> &'static [Language] {
        match self {
            Framework::Spring => &[Language::Java, Language::Kotlin],
            Framework::Django | Framework::FastApi | Framework::Flask => &[Language::Python],
            Framework::Express => &[Language::JavaScript, Language::TypeScript],
            Framework::AspNetCore => &[Language::CSharp],
            Framework::Actix | Framework::Axum => &[Language::Rust],
            Framework::Unknown => &Language::ALL,
        }
    }

    pub fn signals(&self) -> Signals {
        match self {
            Framework::Spring => Signals {
                markers: &[
                    MarkerFile { suffix: "pom.xml", contains: Some("spring") },
                    MarkerFile { suffix: "build.gradle", contains: Some("spring") },
                    MarkerFile { suffix: "build.gradle.kts", contains: Some("spring") },
                ],
                content: &["org.springframework", "@RestController", "@SpringBootApplication"],
                directories: &["src/main/java", "src/main/kotlin"],
            },
            Framework::Django => Signals {
                markers: &[
                    MarkerFile { suffix: "manage.py", contains: Some("django") },
                    MarkerFile { suffix: "requirements.txt", contains: Some("django") },
                    MarkerFile { suffix: "pyproject.toml", contains: Some("django") },
                ],
                content: &["from django", "import django", "from rest_framework"],
                directories: &["migrations"],
            },
            Framework::FastApi => Signals {
                markers: &[
                    MarkerFile { suffix: "requirements.txt", contains: Some("fastapi") },
                    MarkerFile { suffix: "pyproject.toml", contains: Some("fastapi") },
                ],
                content: &["from fastapi", "import fastapi"],
                directories: &["routers"],
            },
            Framework::Flask => Signals {
                markers: &[
                    MarkerFile { suffix: "requirements.txt", contains: Some("flask") },
                    MarkerFile { suffix: "pyproject.toml", contains: Some("flask") },
                ],
                content: &["from flask", "import flask"],
                directories: &["blueprints"],
            },
            Framework::Express => Signals {
                markers: &[MarkerFile { suffix: "package.json", contains: Some("\"express\"") }],
                content: &["require('express')", "require(\"express\")", "from 'express'", "from \"express\""],
                directories: &["routes", "middleware"],
            },
            Framework::AspNetCore => Signals {
                markers: &[MarkerFile { suffix: ".csproj", contains: Some("Microsoft.NET.Sdk.Web") }],
                content: &["Microsoft.AspNetCore", "[ApiController]", "ControllerBase"],
                directories: &["Controllers"],
            },
            Framework::Actix => Signals {
                markers: &[MarkerFile { suffix: "Cargo.toml", contains: Some("actix-web") }],
                content: &["actix_web"],
                directories: &["handlers"],
            },
            Framework::Axum => Signals {
                markers: &[MarkerFile { suffix: "Cargo.toml", contains: Some("axum") }],
                content: &["use axum", "axum::"],
                directories: &["handlers"],
            },
            Framework::Unknown => Signals {
                markers: &[],
                content: &[],
                directories: &[],
            },
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkScore {
    pub framework: Framework,
    pub score: f64,
    pub marker: bool,
    pub density: f64,
    pub directory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub framework: Framework,
    pub confidence: f64,
    /// Every known framework's score, in priority order.
    pub scores: Vec<FrameworkScore>,
}

impl Detection {
    /// Detection result for an explicitly configured framework.
    pub fn forced(framework: Framework) -> Self {
        Self {
            framework,
            confidence: 1.0,
            scores: Vec::new(),
        }
    }
}

pub struct FrameworkDetector {
    sample_limit: usize,
}

impl FrameworkDetector {
    pub fn new(sample_limit: usize) -> Self {
        Self { sample_limit }
    }

    pub fn detect(&self, inventory: &FileInventory) -> Detection {
        let samples = self.sample(inventory);
        let scores: Vec<FrameworkScore> = Framework::KNOWN
            .iter()
            .map(|fw| score_framework(*fw, inventory, &samples))
            .collect();

        // Strictly greater: an equal score never displaces a higher-priority framework.
        let mut best: Option<&FrameworkScore> = None;
        for candidate in &scores {
            if best.map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        let (framework, confidence) = match best {
            Some(top) if top.score > MIN_CONFIDENCE => (top.framework, top.score),
            Some(top) => (Framework::Unknown, top.score),
            None => (Framework::Unknown, 0.0),
        };

        info!(
            "Detected framework {} (confidence {:.2}) from {} sampled files",
            framework,
            confidence,
            samples.len()
        );

        Detection {
            framework,
            confidence,
            scores,
        }
    }

    /// Read the head of the first `sample_limit` source files.
    fn sample(&self, inventory: &FileInventory) -> Vec<(Language, String)> {
        inventory
            .sources
            .iter()
            .take(self.sample_limit)
            .filter_map(|file| {
                read_head(&file.path)
                    .map(|text| (file.language, text))
                    .map_err(|e| debug!("Skipping sample {}: {}", file.relative, e))
                    .ok()
            })
            .collect()
    }
}

fn score_framework(
    framework: Framework,
    inventory: &FileInventory,
    samples: &[(Language, String)],
) -> FrameworkScore {
    let signals = framework.signals();

    let marker = signals.markers.iter().any(|m| {
        inventory.files_ending_with(m.suffix).any(|rel| match m.contains {
            None => true,
            Some(token) => read_head(&inventory.root.join(rel))
                .map(|text| text.to_lowercase().contains(&token.to_lowercase()))
                .unwrap_or(false),
        })
    });

    let languages = framework.languages();
    let relevant: Vec<&String> = samples
        .iter()
        .filter(|(lang, _)| languages.contains(lang))
        .map(|(_, text)| text)
        .collect();
    let hits = relevant
        .iter()
        .filter(|text| signals.content.iter().any(|needle| text.contains(needle)))
        .count();
    let density = if relevant.is_empty() {
        0.0
    } else {
        hits as f64 / relevant.len() as f64
    };

    let directory = signals.directories.iter().any(|d| inventory.has_directory(d));

    let score = MARKER_WEIGHT * f64::from(u8::from(marker))
        + CONTENT_WEIGHT * (2.0 * density).min(1.0)
        + DIRECTORY_WEIGHT * f64::from(u8::from(directory));

    FrameworkScore {
        framework,
        score,
        marker,
        density,
        directory,
    }
}

fn read_head(path: &std::path::Path) -> std::io::Result<String> {
    let mut buf = Vec::new();
    fs::File::open(path)?.take(SAMPLE_BYTES).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
