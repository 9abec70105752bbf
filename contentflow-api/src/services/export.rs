//! Content export renderers

use contentflow_common::Result;
use serde_json::Value;

use crate::models::{Content, ContentResponse, ExportFormat, ProcessingJob};

/// Fields dropped when the caller asks for no metadata
const METADATA_FIELDS: [&str; 4] = [
    "processing_time_ms",
    "token_count_input",
    "token_count_output",
    "cost_usd",
];

/// Render `content` in the requested format
///
/// JSON exports are an object, markdown exports a string.
pub fn render(
    content: Content,
    latest_job: Option<ProcessingJob>,
    format: ExportFormat,
    include_metadata: bool,
) -> Result<Value> {
    match format {
        ExportFormat::Json => to_json(content, latest_job, include_metadata),
        ExportFormat::Markdown => Ok(Value::String(to_markdown(&content, include_metadata))),
    }
}

fn to_json(
    content: Content,
    latest_job: Option<ProcessingJob>,
    include_metadata: bool,
) -> Result<Value> {
    let mut value = serde_json::to_value(ContentResponse::new(content, latest_job))?;
    if !include_metadata {
        if let Some(object) = value.as_object_mut() {
            for field in METADATA_FIELDS {
                object.remove(field);
            }
        }
    }
    Ok(value)
}

pub fn to_markdown(content: &Content, include_metadata: bool) -> String {
    let mut lines = vec![
        format!("# {}", content.source_title.as_deref().unwrap_or("Untitled")),
        String::new(),
        format!("**Source:** {}", content.source_url),
        String::new(),
    ];

    if let Some(summary) = &content.summary {
        lines.extend(["## Summary".to_string(), summary.clone(), String::new()]);
    }

    if !content.key_points.is_empty() {
        lines.push("## Key Points".to_string());
        lines.extend(content.key_points.iter().map(|p| format!("- {}", p)));
        lines.push(String::new());
    }

    for (content_type, item) in &content.generated_content {
        lines.push(format!("## {}", content_type.display_name()));
        lines.push(String::new());
        if let Some(title) = &item.title {
            lines.push(format!("### {}", title));
            lines.push(String::new());
        }
        lines.push(item.body.clone());
        lines.push(String::new());
        if let Some(hashtags) = item.hashtags.as_ref().filter(|h| !h.is_empty()) {
            let tags: Vec<String> = hashtags
                .iter()
                .map(|t| format!("#{}", t.trim_start_matches('#')))
                .collect();
            lines.push(tags.join(" "));
            lines.push(String::new());
        }
        if let Some(cta) = &item.call_to_action {
            lines.push(format!("**Call to action:** {}", cta));
            lines.push(String::new());
        }
    }

    if include_metadata {
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push(format!("- Source type: {}", content.source_type));
        lines.push(format!("- Created: {}", content.created_at.to_rfc3339()));
        if let Some(ms) = content.processing_time_ms {
            lines.push(format!("- Processing time: {} ms", ms));
        }
        if let (Some(input), Some(output)) = (content.token_count_input, content.token_count_output) {
            lines.push(format!("- Tokens: {} in / {} out", input, output));
        }
        if let Some(cost) = content.cost_usd {
            lines.push(format!("- Cost: ${:.4}", cost));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, GeneratedItem, SourceMetadata, SourceType};

    fn processed() -> Content {
        let mut content = Content::new(
            "user_demo",
            SourceType::Youtube,
            "https://youtube.com/watch?v=1",
            SourceMetadata::default(),
        );
        content.source_title = Some("Talk".to_string());
        content.summary = Some("S".to_string());
        content.key_points = vec!["p1".to_string(), "p2".to_string()];
        let mut item = GeneratedItem::new("Thread body");
        item.hashtags = Some(vec!["rust".to_string(), "#async".to_string()]);
        content.generated_content.insert(ContentType::TwitterThread, item);
        content.processing_time_ms = Some(1500);
        content.token_count_input = Some(10);
        content.token_count_output = Some(20);
        content
    }

    #[test]
    fn test_markdown_layout() {
        let md = to_markdown(&processed(), false);
        assert!(md.starts_with("# Talk\n\n**Source:** https://youtube.com/watch?v=1\n"));
        assert!(md.contains("## Summary\nS\n"));
        assert!(md.contains("## Key Points\n- p1\n- p2\n"));
        assert!(md.contains("## Twitter Thread\n\nThread body\n"));
        assert!(md.contains("#rust #async"));
        assert!(!md.contains("Processing time"));
    }

    #[test]
    fn test_markdown_untitled_and_metadata() {
        let mut content = processed();
        content.source_title = None;
        let md = to_markdown(&content, true);
        assert!(md.starts_with("# Untitled"));
        assert!(md.contains("- Processing time: 1500 ms"));
        assert!(md.contains("- Tokens: 10 in / 20 out"));
    }

    #[test]
    fn test_json_export_strips_metadata_on_request() {
        let with = render(processed(), None, ExportFormat::Json, true).unwrap();
        assert_eq!(with["processing_time_ms"], 1500);

        let without = render(processed(), None, ExportFormat::Json, false).unwrap();
        assert!(without.get("processing_time_ms").is_none());
        assert!(without.get("cost_usd").is_none());
        assert_eq!(without["summary"], "S");
    }

    #[test]
    fn test_markdown_export_is_a_string() {
        let value = render(processed(), None, ExportFormat::Markdown, true).unwrap();
        assert!(value.is_string());
    }
}
