use crate::run::{LineageOutcome, Pipeline, RunArgs, RunMode, RunSummary, Status, Step};
use crate::tools::{ToolReport, Toolkit, CORE_FILE};
use color_eyre::eyre::{eyre, Report, Result};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;
use vocsample_table::Table;

/// Genome of lineage `lineage` with sample id `id`.
fn taxon(id: &str) -> String {
    format!("hCoV-19/England/{id}/2021|{id}|2021-01-01")
}

/// Split FASTA text into (header, sequence) records.
fn records(text: &str) -> Vec<(String, String)> {
    text.split('>')
        .filter(|r| !r.trim().is_empty())
        .map(|r| {
            let (header, sequence) = r.split_once('\n').unwrap_or((r, ""));
            (header.trim().to_string(), sequence.replace('\n', ""))
        })
        .collect()
}

fn write_records(path: &Path, records: &[(String, String)]) -> Result<(), Report> {
    let text = records.iter().map(|(h, s)| format!(">{h}\n{s}\n")).collect::<String>();
    std::fs::write(path, text)?;
    Ok(())
}

/// Scripted toolkit: filters and samples in memory, and writes a core summary
/// with the metrics of each sample.
#[derive(Default)]
struct FakeToolkit {
    /// (VARIANT, LOWCOV) of each sample id.
    metrics: HashMap<String, (usize, usize)>,
    /// Lineages whose variant calling fails.
    failing: HashSet<String>,
    /// Operations performed, in order.
    calls: Mutex<Vec<String>>,
}

impl FakeToolkit {
    fn report(&self, tool: &str) -> ToolReport {
        ToolReport { tool: tool.to_string(), version: format!("{tool} 1.0") }
    }

    fn log(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Toolkit for FakeToolkit {
    async fn filter(&self, headers: &Path, fasta: &Path, output: &Path) -> Result<ToolReport, Report> {
        self.log(format!("filter {}", output.display()));
        let wanted = std::fs::read_to_string(headers)?.lines().map(String::from).collect::<HashSet<_>>();
        let kept = records(&std::fs::read_to_string(fasta)?)
            .into_iter()
            .filter(|(header, _)| wanted.contains(header))
            .collect::<Vec<_>>();
        write_records(output, &kept)?;
        Ok(self.report("seqkit"))
    }

    async fn sample(
        &self,
        input: &Path,
        output: &Path,
        count: NonZeroUsize,
        _seed: Option<u64>,
    ) -> Result<ToolReport, Report> {
        self.log(format!("sample {}", output.display()));
        let kept = records(&std::fs::read_to_string(input)?).into_iter().take(count.get()).collect::<Vec<_>>();
        write_records(output, &kept)?;
        Ok(self.report("reformat.sh"))
    }

    async fn call_variants(
        &self,
        manifest: &Path,
        _reference: &Path,
        workdir: &Path,
        _cpus: usize,
    ) -> Result<ToolReport, Report> {
        let lineage = workdir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        self.log(format!("call_variants {lineage}"));
        if self.failing.contains(&lineage) {
            return Err(eyre!("snippy-multi exited with status 1"));
        }

        let mut core = String::from("ID\tLENGTH\tALIGNED\tUNALIGNED\tVARIANT\tHET\tMASKED\tLOWCOV\n");
        core.push_str("Reference\t29903\t29903\t0\t0\t0\t0\t0\n");
        for line in std::fs::read_to_string(manifest)?.lines() {
            let (id, _path) = line.split_once('\t').unwrap_or((line, ""));
            let (variant, lowcov) = self.metrics.get(id).copied().unwrap_or_default();
            core.push_str(&format!("{id}\t29903\t29800\t103\t{variant}\t0\t0\t{lowcov}\n"));
        }
        std::fs::write(workdir.join(CORE_FILE), core)?;
        Ok(self.report("snippy"))
    }
}

struct Fixture {
    dir: TempDir,
    args: RunArgs,
    classification: Table<String>,
    toolkit: FakeToolkit,
}

impl Fixture {
    /// P.1 has genomes A, B, C; B.1.1.7 has D, E; P.2 has none.
    fn new() -> Result<Self, Report> {
        let dir = TempDir::new()?;
        let genomes = [("A", "P.1"), ("B", "P.1"), ("C", "P.1"), ("D", "B.1.1.7"), ("E", "B.1.1.7")];

        let mut classification = Table::with_headers(&["taxon", "lineage", "probability"].map(String::from));
        for (id, lineage) in genomes {
            classification.add_row([taxon(id), lineage.to_string(), "1.0".to_string()])?;
        }

        let fasta = dir.path().join("sequences.fasta");
        let all = genomes.iter().map(|(id, _)| (taxon(id), "ACGT".to_string())).collect::<Vec<_>>();
        write_records(&fasta, &all)?;

        let output_dir = dir.path().join("output");
        std::fs::create_dir_all(&output_dir)?;

        let args = RunArgs {
            fasta: Some(fasta),
            seq_num: NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN),
            ref_path: dir.path().join("references"),
            output_dir,
            ..Default::default()
        };

        let metrics = [("A", (5, 9)), ("B", (5, 1)), ("C", (1, 4)), ("D", (7, 0)), ("E", (3, 0))];
        let toolkit = FakeToolkit {
            metrics: metrics.into_iter().map(|(id, m)| (id.to_string(), m)).collect(),
            ..Default::default()
        };

        Ok(Fixture { dir, args, classification, toolkit })
    }

    async fn run(&self, mode: RunMode, lineages: &[&str]) -> Result<(Table<String>, Vec<LineageOutcome>), Report> {
        let pipeline = Pipeline { toolkit: &self.toolkit, args: &self.args, mode, classification: &self.classification };
        let lineages = lineages.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        pipeline.run(&lineages).await
    }

    fn output(&self, name: &str) -> std::path::PathBuf {
        self.args.output_dir.join(name)
    }
}

fn statuses(outcomes: &[LineageOutcome]) -> Vec<String> {
    outcomes.iter().map(|o| o.status.to_string()).collect()
}

#[tokio::test]
async fn standard_mode() -> Result<(), Report> {
    let fixture = Fixture::new()?;
    let cwd = std::env::current_dir()?;

    let (combined, outcomes) = fixture.run(RunMode::Standard, &["P.1", "P.2", "B.1.1.7"]).await?;
    assert_eq!(std::env::current_dir()?, cwd);

    assert_eq!(statuses(&outcomes), ["completed", "empty", "completed"]);
    // first two genomes of each lineage, sorted by VARIANT then LOWCOV
    assert_eq!(combined.get_column("ID")?, [&"B", &"A", &"E", &"D"]);
    assert_eq!(combined.get_column("lineage")?, [&"P.1", &"P.1", &"B.1.1.7", &"B.1.1.7"]);

    let p1 = &outcomes[0];
    assert_eq!((p1.sequences, p1.samples), (3, 2));
    assert_eq!(p1.tools.iter().map(|t| t.tool.as_str()).collect::<Vec<_>>(), ["seqkit", "reformat.sh", "snippy"]);
    let merge = p1.merge.clone().unwrap_or_default();
    assert_eq!((merge.joined, merge.unmatched_variant_calls), (2, 1));
    // C was not sampled; D and E belong to B.1.1.7
    assert_eq!(merge.unmatched_classification, 1);

    // the combined table is persisted
    let written = Table::read(&fixture.output("Pango_Random_Genomes.tsv"), None)?;
    assert_eq!(written, Table { path: written.path.clone(), ..combined });

    assert!(fixture.output("P.1_2RandomGenomes.fasta").is_file());
    assert!(fixture.output("P.1/B.fasta").is_file());
    Ok(())
}

#[tokio::test]
async fn empty_lineage() -> Result<(), Report> {
    let fixture = Fixture::new()?;
    let (combined, outcomes) = fixture.run(RunMode::Standard, &["P.2"]).await?;

    assert!(combined.is_empty());
    assert_eq!(outcomes[0].status, Status::Empty);
    assert_eq!(std::fs::read_to_string(fixture.output("P.2.txt"))?, "");
    assert_eq!(std::fs::read_to_string(fixture.output("P.2/P.2.tab"))?, "");
    assert!(fixture.toolkit.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn failure_is_isolated() -> Result<(), Report> {
    let mut fixture = Fixture::new()?;
    fixture.toolkit.failing.insert("P.1".to_string());

    let (combined, outcomes) = fixture.run(RunMode::Standard, &["P.1", "B.1.1.7"]).await?;

    match &outcomes[0].status {
        Status::Failed { step, diagnostic } => {
            assert_eq!(*step, Step::VariantCalling);
            assert!(diagnostic.contains("exited with status 1"));
        }
        status => return Err(eyre!("Unexpected status: {status}")),
    }
    assert_eq!(outcomes[1].status, Status::Completed);
    assert_eq!(combined.get_column("ID")?, [&"E", &"D"]);
    Ok(())
}

#[tokio::test]
async fn all_samples_mode() -> Result<(), Report> {
    let fixture = Fixture::new()?;
    let (combined, outcomes) = fixture.run(RunMode::AllSamples, &["P.1"]).await?;

    assert_eq!(outcomes[0].samples, 3);
    assert_eq!(combined.get_column("ID")?, [&"C", &"B", &"A"]);
    let calls = fixture.toolkit.calls();
    assert!(calls.iter().all(|c| !c.starts_with("sample")), "{calls:?}");
    Ok(())
}

#[tokio::test]
async fn random_only_mode() -> Result<(), Report> {
    let mut fixture = Fixture::new()?;
    fixture.run(RunMode::Standard, &["P.1"]).await?;

    fixture.args.fasta = None;
    fixture.args.seq_num = NonZeroUsize::MIN;
    let (combined, outcomes) = fixture.run(RunMode::RandomOnly, &["P.1"]).await?;

    assert_eq!(outcomes[0].status, Status::Completed);
    assert_eq!(combined.get_column("ID")?, [&"A"]);
    // filtered sequences are reused, the previous sample is removed
    assert!(fixture.output("P.1.fasta").is_file());
    assert!(fixture.output("P.1_1RandomGenomes.fasta").is_file());
    assert!(!fixture.output("P.1_2RandomGenomes.fasta").exists());

    let calls = fixture.toolkit.calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("filter")).count(), 1, "{calls:?}");
    Ok(())
}

#[tokio::test]
async fn random_only_without_filtered_sequences() -> Result<(), Report> {
    let fixture = Fixture::new()?;
    let (_, outcomes) = fixture.run(RunMode::RandomOnly, &["P.1"]).await?;

    assert!(matches!(outcomes[0].status, Status::Failed { step: Step::Sample, .. }));
    assert!(fixture.output("Pango_Random_Genomes.tsv").is_file());
    Ok(())
}

#[tokio::test]
async fn rerun_replaces_artifacts() -> Result<(), Report> {
    let fixture = Fixture::new()?;
    fixture.run(RunMode::Standard, &["P.1"]).await?;
    let (combined, _) = fixture.run(RunMode::Standard, &["P.1"]).await?;

    assert_eq!(combined.len(), 2);
    let manifest = std::fs::read_to_string(fixture.output("P.1/P.1.tab"))?;
    assert_eq!(manifest.lines().count(), 2);
    Ok(())
}

#[test]
fn mode_flags() -> Result<(), Report> {
    let mut args = RunArgs::default();
    assert_eq!(args.mode()?, RunMode::Standard);
    args.all_samples = true;
    assert_eq!(args.mode()?, RunMode::AllSamples);
    args.random_only = true;
    assert!(args.mode().is_err());
    args.all_samples = false;
    assert_eq!(args.mode()?, RunMode::RandomOnly);
    Ok(())
}

#[test]
fn summary_serialization() -> Result<(), Report> {
    let mut failed = LineageOutcome::new("P.1");
    failed.status = Status::Failed { step: Step::VariantCalling, diagnostic: "boom".to_string() };
    let mut completed = LineageOutcome::new("B.1.1.7");
    completed.status = Status::Completed;

    let summary = RunSummary {
        version: "0.1.0".to_string(),
        timestamp: chrono::Local::now(),
        mode: RunMode::Standard,
        args: RunArgs::default(),
        outcomes: vec![failed, completed],
        ids: None,
    };

    let value = serde_json::to_value(&summary)?;
    assert_eq!(value["outcomes"][0]["status"]["status"], "failed");
    assert_eq!(value["outcomes"][0]["status"]["step"], "variant_calling");
    assert_eq!(value["mode"], "Standard");

    let table = summary.to_table()?;
    assert_eq!(table.get_column("status")?, [&"failed (variant_calling)", &"completed"]);
    assert_eq!(summary.failed().len(), 1);

    let dir = TempDir::new()?;
    let path = dir.path().join("run_summary.json");
    summary.write(&path)?;
    let read: RunSummary = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(read.outcomes, summary.outcomes);
    Ok(())
}
