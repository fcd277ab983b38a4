//! External sequence-filtering, down-sampling and variant-calling tools.

use clap::Args;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;


/// Number of stderr lines kept in the diagnostic of a failed command.
const STDERR_TAIL: usize = 10;

/// Time allowed for a tool to report its version.
const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Script of variant-calling commands, written inside the working directory.
pub const SCRIPT_FILE: &str = "runme.sh";

/// Core summary of the variant caller, written inside the working directory.
pub const CORE_FILE: &str = "core.txt";

/// Identity and version of the tool that performed an operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ToolReport {
    pub tool: String,
    pub version: String,
}

/// The external operations of the pipeline.
///
/// Every operation blocks the pipeline until the tool finishes, and fails
/// if the tool cannot be started, exits unsuccessfully or times out.
#[allow(async_fn_in_trait)]
pub trait Toolkit {
    /// Extract the sequences of `fasta` whose header is listed in `headers`.
    async fn filter(&self, headers: &Path, fasta: &Path, output: &Path) -> Result<ToolReport, Report>;

    /// Randomly draw `count` sequences of `input`.
    async fn sample(
        &self,
        input: &Path,
        output: &Path,
        count: NonZeroUsize,
        seed: Option<u64>,
    ) -> Result<ToolReport, Report>;

    /// Call variants of every sample in `manifest` against `reference`.
    ///
    /// Runs inside `workdir`, where the core summary (`core.txt`) is written.
    async fn call_variants(
        &self,
        manifest: &Path,
        reference: &Path,
        workdir: &Path,
        cpus: usize,
    ) -> Result<ToolReport, Report>;
}

/// Programs used for each external tool.
#[derive(Args, Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Tools {
    /// Sequence filtering program.
    #[clap(long, default_value_t = Tools::default().seqkit)]
    pub seqkit: String,

    /// Random down-sampling program (BBMap).
    #[clap(long, default_value_t = Tools::default().reformat)]
    pub reformat: String,

    /// Variant calling program, run once per lineage.
    #[clap(long, default_value_t = Tools::default().snippy_multi)]
    pub snippy_multi: String,

    /// Program queried for the variant caller version.
    #[clap(long, default_value_t = Tools::default().snippy)]
    pub snippy: String,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            seqkit: "seqkit".to_string(),
            reformat: "reformat.sh".to_string(),
            snippy_multi: "snippy-multi".to_string(),
            snippy: "snippy".to_string(),
        }
    }
}

/// [`Toolkit`] backed by seqkit, BBMap and snippy.
#[derive(Clone, Debug)]
pub struct ExternalTools {
    pub tools: Tools,
    pub timeout: Option<Duration>,
    seqkit: ToolReport,
    reformat: ToolReport,
    snippy: ToolReport,
}

impl ExternalTools {
    /// Query the version of every tool once, for provenance.
    ///
    /// A tool that cannot report a version is still used, its version is
    /// recorded as unknown.
    pub async fn probe(tools: &Tools, timeout: Option<Duration>) -> Self {
        let seqkit = version(&tools.seqkit, &["version"]).await;
        let reformat = version(&tools.reformat, &["--version"]).await;
        let snippy = version(&tools.snippy, &["--version"]).await;
        info!("Using: {}, {}, {}", seqkit.version, reformat.version, snippy.version);

        ExternalTools { tools: tools.clone(), timeout, seqkit, reformat, snippy }
    }
}

impl Toolkit for ExternalTools {
    async fn filter(&self, headers: &Path, fasta: &Path, output: &Path) -> Result<ToolReport, Report> {
        let mut command = Command::new(&self.tools.seqkit);
        command.args(["grep", "-n", "-f"]).arg(headers).arg(fasta).arg("-o").arg(output);
        run(command, self.timeout).await?;
        Ok(self.seqkit.clone())
    }

    async fn sample(
        &self,
        input: &Path,
        output: &Path,
        count: NonZeroUsize,
        seed: Option<u64>,
    ) -> Result<ToolReport, Report> {
        let mut command = Command::new(&self.tools.reformat);
        command
            .arg(format!("in={}", input.display()))
            .arg(format!("out={}", output.display()))
            .arg(format!("samplereadstarget={count}"))
            .arg("overwrite=t");
        if let Some(seed) = seed {
            command.arg(format!("sampleseed={seed}"));
        }
        run(command, self.timeout).await?;
        Ok(self.reformat.clone())
    }

    async fn call_variants(
        &self,
        manifest: &Path,
        reference: &Path,
        workdir: &Path,
        cpus: usize,
    ) -> Result<ToolReport, Report> {
        if !reference.is_file() {
            return Err(eyre!("Reference sequence does not exist: {reference:?}"))
                .suggestion("--ref-path should contain one {lineage}.fasta per lineage.");
        }
        // the tool runs inside workdir, relative paths would no longer resolve
        let reference = reference.canonicalize().wrap_err_with(|| format!("Failed to resolve: {reference:?}"))?;
        let manifest = manifest.canonicalize().wrap_err_with(|| format!("Failed to resolve: {manifest:?}"))?;

        // snippy-multi prints the commands to run, one snippy per sample then snippy-core
        let mut command = Command::new(&self.tools.snippy_multi);
        command
            .arg(&manifest)
            .arg("--ref")
            .arg(&reference)
            .arg("--cpus")
            .arg(cpus.to_string())
            .current_dir(workdir);
        let output = run(command, self.timeout).await?;

        let script = workdir.join(SCRIPT_FILE);
        std::fs::write(&script, &output.stdout).wrap_err_with(|| format!("Failed to write: {script:?}"))?;

        let mut command = Command::new("sh");
        command.arg(SCRIPT_FILE).current_dir(workdir);
        run(command, self.timeout).await?;

        let core = workdir.join(CORE_FILE);
        if !core.is_file() {
            return Err(eyre!("Variant calling finished without a core summary: {core:?}"))
                .suggestion(format!("Check the logs in {workdir:?}"));
        }
        Ok(self.snippy.clone())
    }
}

/// Run a command to completion, capturing its output.
///
/// The command fails if it cannot be started, exits unsuccessfully, or
/// outlives `timeout`; an expired command is killed.
pub async fn run(mut command: Command, timeout: Option<Duration>) -> Result<Output, Report> {
    let line = command_line(&command);
    debug!("Running: {line}");

    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
    let child = command
        .spawn()
        .wrap_err_with(|| format!("Failed to start: {line}"))
        .suggestion("Is the tool installed and on your PATH?")?;

    let output = match timeout {
        Some(duration) => tokio::time::timeout(duration, child.wait_with_output())
            .await
            .map_err(|_| eyre!("Timed out after {}s: {line}", duration.as_secs()))?,
        None => child.wait_with_output().await,
    }
    .wrap_err_with(|| format!("Failed to wait for: {line}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines = stderr.lines().collect_vec();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
        return Err(eyre!("Command failed ({}): {line}", output.status)).with_suggestion(|| match tail.is_empty() {
            true => "The command did not write to stderr.".to_string(),
            false => format!("stderr:\n{tail}"),
        });
    }

    Ok(output)
}

/// Space separated program and arguments, for logs and diagnostics.
fn command_line(command: &Command) -> String {
    let command = command.as_std();
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|arg| arg.to_string_lossy())
        .join(" ")
}

/// Ask a program for its version: the first line it prints.
async fn version(program: &str, args: &[&str]) -> ToolReport {
    let mut command = Command::new(program);
    command.args(args);

    let version = match run(command, Some(VERSION_TIMEOUT)).await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            stdout.lines().chain(stderr.lines()).map(str::trim).find(|l| !l.is_empty()).map(String::from)
        }
        Err(e) => {
            debug!("Unable to query the version of {program}: {e}");
            None
        }
    };

    ToolReport {
        tool: program.to_string(),
        version: version.unwrap_or_else(|| format!("{program} (version unknown)")),
    }
}
