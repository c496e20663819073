//! Dataset export.
//!
//! Renders a project's current label state as JSON, CSV, or COCO-style
//! classification JSON. Rendering is pure: callers fetch the rows, this
//! module only serializes them.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{Image, Project};
use crate::error::{Error, Result};

/// Supported export formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Coco,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json | Self::Coco => "json",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json | Self::Coco => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "coco" => Ok(Self::Coco),
            other => Err(Error::InvalidInput(format!(
                "Unsupported export format: {} (expected json, csv or coco)",
                other
            ))),
        }
    }
}

/// A rendered export ready to be sent as a download.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonExport<'a> {
    project: JsonProject<'a>,
    images: Vec<JsonImage<'a>>,
    summary: ExportSummary,
}

#[derive(Debug, Serialize)]
struct JsonProject<'a> {
    id: &'a str,
    name: &'a str,
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct JsonImage<'a> {
    id: &'a str,
    filename: &'a str,
    filepath: &'a str,
    label: Option<&'a str>,
    confidence: Option<f64>,
    is_verified: bool,
}

impl<'a> From<&'a Image> for JsonImage<'a> {
    fn from(image: &'a Image) -> Self {
        Self {
            id: &image.id,
            filename: &image.filename,
            filepath: &image.filepath,
            label: image.label.as_deref(),
            confidence: image.confidence,
            is_verified: image.is_verified,
        }
    }
}

/// Totals over the exported images.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub total_images: usize,
    pub verified: usize,
    pub unverified: usize,
    /// Images per label. Every project label appears, even at zero.
    pub label_counts: BTreeMap<String, usize>,
}

impl ExportSummary {
    pub fn compute(project: &Project, images: &[Image]) -> Self {
        let mut label_counts: BTreeMap<String, usize> =
            project.labels.iter().map(|l| (l.clone(), 0)).collect();

        for label in images.iter().filter_map(|i| i.label.as_ref()) {
            *label_counts.entry(label.clone()).or_insert(0) += 1;
        }

        let verified = images.iter().filter(|i| i.is_verified).count();

        Self {
            total_images: images.len(),
            verified,
            unverified: images.len() - verified,
            label_counts,
        }
    }
}

fn render_json(project: &Project, images: &[Image]) -> Result<Vec<u8>> {
    let export = JsonExport {
        project: JsonProject {
            id: &project.id,
            name: &project.name,
            labels: &project.labels,
        },
        images: images.iter().map(JsonImage::from).collect(),
        summary: ExportSummary::compute(project, images),
    };

    serde_json::to_vec_pretty(&export)
        .map_err(|e| Error::Export(format!("Failed to encode JSON export: {}", e)))
}

// ============================================================================
// CSV
// ============================================================================

fn render_csv(images: &[Image]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    // Written explicitly so an empty export still has a header row.
    writer.write_record([
        "id",
        "filename",
        "filepath",
        "label",
        "confidence",
        "is_verified",
    ])?;

    for image in images {
        let confidence = image.confidence.map(|c| c.to_string()).unwrap_or_default();
        writer.write_record([
            image.id.as_str(),
            image.filename.as_str(),
            image.filepath.as_str(),
            image.label.as_deref().unwrap_or(""),
            confidence.as_str(),
            if image.is_verified { "true" } else { "false" },
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Export(format!("Failed to flush CSV export: {}", e.error())))
}

// ============================================================================
// COCO
// ============================================================================

#[derive(Debug, Serialize)]
struct CocoDataset<'a> {
    info: CocoInfo,
    images: Vec<CocoImage<'a>>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory<'a>>,
}

#[derive(Debug, Serialize)]
struct CocoInfo {
    description: String,
    version: &'static str,
    date_created: String,
}

#[derive(Debug, Serialize)]
struct CocoImage<'a> {
    id: u64,
    file_name: &'a str,
    width: Option<i64>,
    height: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CocoCategory<'a> {
    id: u64,
    name: &'a str,
    supercategory: &'static str,
}

#[derive(Debug, Serialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    category_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

fn render_coco(project: &Project, images: &[Image]) -> Result<Vec<u8>> {
    let categories: Vec<CocoCategory> = project
        .labels
        .iter()
        .enumerate()
        .map(|(idx, name)| CocoCategory {
            id: idx as u64 + 1,
            name,
            supercategory: "none",
        })
        .collect();

    let category_id = |label: &str| categories.iter().find(|c| c.name == label).map(|c| c.id);

    let mut coco_images = Vec::with_capacity(images.len());
    let mut annotations = Vec::new();

    for (idx, image) in images.iter().enumerate() {
        let image_id = idx as u64 + 1;
        coco_images.push(CocoImage {
            id: image_id,
            file_name: &image.stored_name,
            width: image.width,
            height: image.height,
        });

        if let Some(category_id) = image.label.as_deref().and_then(category_id) {
            annotations.push(CocoAnnotation {
                id: annotations.len() as u64 + 1,
                image_id,
                category_id,
                score: image.confidence,
            });
        }
    }

    let dataset = CocoDataset {
        info: CocoInfo {
            description: format!("{} labels", project.name),
            version: "1.0",
            date_created: Utc::now().to_rfc3339(),
        },
        images: coco_images,
        annotations,
        categories,
    };

    serde_json::to_vec_pretty(&dataset)
        .map_err(|e| Error::Export(format!("Failed to encode COCO export: {}", e)))
}

// ============================================================================
// Entry point
// ============================================================================

/// Render `images` of `project` in the requested format.
pub fn render(project: &Project, images: &[Image], format: ExportFormat) -> Result<ExportDocument> {
    let body = match format {
        ExportFormat::Json => render_json(project, images)?,
        ExportFormat::Csv => render_csv(images)?,
        ExportFormat::Coco => render_coco(project, images)?,
    };

    Ok(ExportDocument {
        filename: format!("{}_labels.{}", slugify(&project.name), format.extension()),
        content_type: format.content_type(),
        body,
    })
}

/// Lowercase ASCII slug for download filenames.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::Value;

    fn project() -> Project {
        Project {
            id: "proj-1".to_string(),
            name: "Pets & Friends".to_string(),
            labels: vec!["dog".to_string(), "cat".to_string()],
            created_at: "2024-01-01 00:00:00".to_string(),
            updated_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    fn image(id: &str, label: Option<&str>, confidence: Option<f64>, verified: bool) -> Image {
        Image {
            id: id.to_string(),
            project_id: "proj-1".to_string(),
            filename: format!("{}.png", id),
            stored_name: format!("20240101_000000_abc_{}.png", id),
            filepath: format!("data/uploads/20240101_000000_abc_{}.png", id),
            content_type: "image/png".to_string(),
            size_bytes: 10,
            width: Some(64),
            height: Some(48),
            label: label.map(String::from),
            confidence,
            is_verified: verified,
            created_at: "2024-01-01 00:00:00".to_string(),
            updated_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    fn sample_images() -> Vec<Image> {
        vec![
            image("a", Some("dog"), Some(0.9), false),
            image("b", Some("cat"), None, true),
            image("c", None, None, false),
            image("d", Some("ferret"), Some(0.4), false),
        ]
    }

    #[rstest]
    #[case("json", ExportFormat::Json)]
    #[case("CSV", ExportFormat::Csv)]
    #[case(" coco ", ExportFormat::Coco)]
    fn test_parse_format(#[case] input: &str, #[case] expected: ExportFormat) {
        assert_eq!(input.parse::<ExportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_format() {
        assert!(matches!(
            "tfrecord".parse::<ExportFormat>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[rstest]
    #[case("Pets & Friends", "pets-friends")]
    #[case("  Street Signs 2024 ", "street-signs-2024")]
    #[case("日本", "project")]
    fn test_slugify(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[test]
    fn test_json_export() {
        let doc = render(&project(), &sample_images(), ExportFormat::Json).unwrap();
        assert_eq!(doc.filename, "pets-friends_labels.json");
        assert_eq!(doc.content_type, "application/json");

        let value: Value = serde_json::from_slice(&doc.body).unwrap();
        assert_eq!(value["project"]["labels"], serde_json::json!(["dog", "cat"]));
        assert_eq!(value["images"].as_array().unwrap().len(), 4);
        assert_eq!(value["images"][2]["label"], Value::Null);
        assert_eq!(value["summary"]["total_images"], 4);
        assert_eq!(value["summary"]["verified"], 1);
        assert_eq!(value["summary"]["unverified"], 3);
        assert_eq!(
            value["summary"]["label_counts"],
            serde_json::json!({"cat": 1, "dog": 1, "ferret": 1})
        );
    }

    #[test]
    fn test_csv_export() {
        let doc = render(&project(), &sample_images(), ExportFormat::Csv).unwrap();
        assert_eq!(doc.filename, "pets-friends_labels.csv");

        let text = String::from_utf8(doc.body).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,filename,filepath,label,confidence,is_verified");
        assert_eq!(
            lines[1],
            "a,a.png,data/uploads/20240101_000000_abc_a.png,dog,0.9,false"
        );
        assert_eq!(lines[3], "c,c.png,data/uploads/20240101_000000_abc_c.png,,,false");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_csv_export_empty_has_header() {
        let doc = render(&project(), &[], ExportFormat::Csv).unwrap();
        assert_eq!(
            String::from_utf8(doc.body).unwrap(),
            "id,filename,filepath,label,confidence,is_verified\n"
        );
    }

    #[test]
    fn test_coco_export() {
        let doc = render(&project(), &sample_images(), ExportFormat::Coco).unwrap();
        let value: Value = serde_json::from_slice(&doc.body).unwrap();

        let categories = value["categories"].as_array().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0]["id"], 1);
        assert_eq!(categories[0]["name"], "dog");
        assert_eq!(categories[1]["supercategory"], "none");

        let images = value["images"].as_array().unwrap();
        assert_eq!(images.len(), 4);
        assert_eq!(images[0]["id"], 1);
        assert_eq!(images[0]["width"], 64);

        // Unlabeled and out-of-set images get no annotation.
        let annotations = value["annotations"].as_array().unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0]["image_id"], 1);
        assert_eq!(annotations[0]["category_id"], 1);
        assert_eq!(annotations[0]["score"], 0.9);
        assert_eq!(annotations[1]["image_id"], 2);
        assert_eq!(annotations[1]["category_id"], 2);
        assert!(annotations[1].get("score").is_none());
    }
}
