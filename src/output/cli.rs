use super::ScanReport;
use crate::model::DependencyRecord;
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct BaseRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct DependencyRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Entries")]
    entries: String,
    #[tabled(rename = "Version")]
    version: String,
}

#[derive(Tabled)]
struct ProvenanceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "URL")]
    url: String,
}

pub fn print_cli_table(report: &ScanReport) -> Result<()> {
    let metadata = &report.metadata;

    println!();
    println!("Image: {}", report.image);
    println!(
        "Scan completed at: {}",
        report.scanned_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    match &metadata.base {
        Some(base) if !base.is_empty() => {
            let rows: Vec<BaseRow> = base
                .iter()
                .map(|(field, value)| BaseRow {
                    field: field.clone(),
                    value: truncate(value, 60),
                })
                .collect();
            println!("Base OS:");
            println!("{}", Table::new(rows).with(Style::rounded()).to_string());
        }
        _ => println!("Base OS: not identified"),
    }

    println!();
    if metadata.dependencies.is_empty() {
        println!("No dependencies found.");
    } else {
        println!("Found {} dependencies:", metadata.dependencies.len());
        println!();

        let rows: Vec<DependencyRow> = metadata.dependencies.iter().map(dependency_row).collect();
        println!("{}", Table::new(rows).with(Style::rounded()).to_string());
    }

    if !metadata.provenance.is_empty() {
        println!();
        println!("Provenance:");
        let rows: Vec<ProvenanceRow> = metadata
            .provenance
            .iter()
            .map(|p| ProvenanceRow {
                name: p.name.clone(),
                version: p.version.clone(),
                url: truncate(&p.url, 60),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()).to_string());
    }

    println!();
    if report.warnings.is_empty() {
        println!("No differences from the embedded label.");
    } else {
        println!("{} warnings:", report.warnings.len());
        for warning in &report.warnings {
            println!("  [{}] {}", warning.tag(), warning);
        }
    }

    Ok(())
}

fn dependency_row(record: &DependencyRecord) -> DependencyRow {
    let entries = record
        .source
        .metadata
        .get("packages")
        .and_then(|p| p.as_array())
        .map(|p| p.len().to_string())
        .unwrap_or_else(|| "-".to_string());

    let version = match record.sha256() {
        Some(sha) => format!("sha256:{}", truncate(sha, 15)),
        None => record
            .source
            .version
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
    };

    DependencyRow {
        kind: record.kind.to_string(),
        source: record.source.kind.clone(),
        entries,
        version,
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
