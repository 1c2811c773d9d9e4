use crate::merge::RankedListDocument;
use crate::types::CategorizedRecord;

/// Human-readable rendering of a ranked list, one section per partition.
pub fn render_markdown(document: &RankedListDocument, title: &str) -> String {
    let mut lines = vec![format!("# {title}"), String::new()];

    for partition in &document.partitions {
        if partition.entries.is_empty() {
            continue;
        }
        lines.push(format!("## {}", partition.category));
        for entry in &partition.entries {
            render_entry(&mut lines, entry);
        }
        lines.push(String::new());
    }

    if !document.archived.is_empty() {
        lines.push("## Archived".to_string());
        for archived in &document.archived {
            let record = archived.entry.record();
            lines.push(format!(
                "- [{}]({}) (archived {})",
                record.id,
                record.url,
                archived.archived_at.format("%Y-%m-%d")
            ));
        }
        lines.push(String::new());
    }

    let mut out = lines.join("\n").trim_end().to_string();
    out.push('\n');
    out
}

fn render_entry(lines: &mut Vec<String>, entry: &CategorizedRecord) {
    let record = entry.record();
    lines.push(format!(
        "- **[{}]({})** (Score: {:.2})",
        record.id,
        record.url,
        entry.score()
    ));
    lines.push(format!(
        "  - License: {} | Stars: {} | Forks: {}",
        record.license_id(),
        record.stars,
        record.forks
    ));

    let mut extra = Vec::new();
    if let Some(prs) = record.open_prs {
        extra.push(format!("PRs open: {prs}"));
    }
    if let Some(discussions) = record.discussions {
        extra.push(format!(
            "Discussions: {}",
            if discussions > 0 { "Yes" } else { "No" }
        ));
    }
    if let Some(contributors) = record.contributors {
        extra.push(format!("Contributors: {contributors}"));
    }
    if let Some(days) = record.days_since_commit() {
        extra.push(format!("Last push: {days} days ago"));
    }
    if !extra.is_empty() {
        lines.push(format!("  - {}", extra.join(" | ")));
    }

    let description = record.description.trim();
    if !description.is_empty() {
        lines.push(format!("  - Description: {description}"));
    }
}
