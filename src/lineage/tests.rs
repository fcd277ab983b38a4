use crate::lineage::{filter, read_list, sample_id, validate_taxa};
use color_eyre::eyre::{Report, Result};
use std::io::Write;
use tempfile::NamedTempFile;
use vocsample_table::Table;

fn classification() -> Result<Table<String>, Report> {
    let mut table = Table::new();
    table.headers = ["taxon", "lineage", "probability"].map(String::from).to_vec();
    for (taxon, lineage) in [
        ("hCoV-19/a|EPI_1|2021", "B.1.1.7"),
        ("hCoV-19/b|EPI_2|2021", "P.1"),
        ("hCoV-19/c|EPI_3|2021", "b.1.1.7"),
        ("hCoV-19/d|EPI_4|2021", "B.1.351"),
        ("hCoV-19/e|EPI_5|2021", "B.1.1.7"),
    ] {
        table.add_row([taxon, lineage, "1.0"].map(String::from))?;
    }
    Ok(table)
}

#[test]
fn filter_keeps_listed_lineages_in_order() -> Result<(), Report> {
    let table = classification()?;
    let observed = filter(&table, &["P.1", "B.1.1.7"])?;
    assert_eq!(observed.get_column("taxon")?, [
        "hCoV-19/a|EPI_1|2021",
        "hCoV-19/b|EPI_2|2021",
        "hCoV-19/e|EPI_5|2021"
    ]);
    assert_eq!(observed.headers, table.headers);
    Ok(())
}

#[test]
fn filter_is_case_sensitive() -> Result<(), Report> {
    let observed = filter(&classification()?, &["b.1.1.7"])?;
    assert_eq!(observed.len(), 1);
    assert_eq!(observed.get("taxon", 0)?, "hCoV-19/c|EPI_3|2021");
    Ok(())
}

#[test]
fn filter_without_matches_is_empty() -> Result<(), Report> {
    let observed = filter(&classification()?, &["XBB.1.5"])?;
    assert!(observed.is_empty());
    Ok(())
}

#[test]
fn filter_requires_lineage_column() -> Result<(), Report> {
    let mut table = Table::new();
    table.headers = vec!["taxon".to_string()];
    assert!(filter(&table, &["P.1"]).is_err());
    Ok(())
}

#[test]
fn read_list_trims_and_dedups() -> Result<(), Report> {
    let mut file = NamedTempFile::new()?;
    write!(file, "B.1.1.7\r\n\n  P.1 \nB.1.1.7\nB.1.617.2")?;
    let observed = read_list(&file.path())?;
    assert_eq!(observed, ["B.1.1.7", "P.1", "B.1.617.2"]);
    Ok(())
}

#[test]
fn read_list_rejects_paths() -> Result<(), Report> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "P.1\n../P.2")?;
    assert!(read_list(&file.path()).is_err());
    Ok(())
}

#[test]
fn read_list_rejects_empty() -> Result<(), Report> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "\n\n")?;
    assert!(read_list(&file.path()).is_err());
    Ok(())
}

#[test]
fn sample_id_segments() -> Result<(), Report> {
    assert_eq!(sample_id("a|EPI_ISL_1|2021-01-01")?, "EPI_ISL_1");
    assert_eq!(sample_id("a|EPI_ISL_1")?, "EPI_ISL_1");
    assert!(sample_id("a||2021").is_err());
    assert!(sample_id("").is_err());
    Ok(())
}

#[test]
fn validate_taxa_counts_malformed() -> Result<(), Report> {
    let mut table = classification()?;
    table.add_row(["no-pipes-here", "P.1", "0.9"].map(String::from))?;
    assert_eq!(validate_taxa(&table)?, 1);
    Ok(())
}
