use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};

use casecorpus::cancel::CancellationToken;
use casecorpus::config::{CaseType, Config, PackageFormat};
use casecorpus::correlate::CorrelationEngine;
use casecorpus::dispatch::AnalyzerDispatch;
use casecorpus::errors::{ExitStatus, PipelineError, PipelineResult};
use casecorpus::llm::{provider_from_env, LlmClient};
use casecorpus::logger::Logger;
use casecorpus::package::PackageBuilder;
use casecorpus::pipeline::{exit_for_error, ConsoleProgress, Pipeline};
use casecorpus::readers::DefaultReader;
use casecorpus::store::EvidenceStore;
use casecorpus::summary::SummaryGenerator;

fn main() {
    let matches = Command::new("casecorpus")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Forensic evidence analysis pipeline for legal investigations")
        .long_about(
            "casecorpus ingests a directory of mixed evidence files into a tamper-evident, \
             content-addressed store, analyzes each artifact with structured-output language \
             models, correlates entities and timelines across the case, and packages a \
             client deliverable with cross-evidence findings and generated reports.",
        )
        .arg(
            Arg::new("storage-root")
                .long("storage-root")
                .value_name("DIR")
                .global(true)
                .help("Store root directory (default: ./evidence-store or CASECORPUS_STORAGE_ROOT)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable verbose logging to stderr"),
        )
        .subcommand(
            Command::new("process-case")
                .about("Run the full pipeline: ingest, analyze, correlate, summarize, package")
                .arg(Arg::new("dir").long("dir").value_name("DIR").required(true)
                    .help("Directory of evidence files"))
                .arg(Arg::new("case").long("case").value_name("CASE_ID").required(true))
                .arg(Arg::new("force").long("force").action(ArgAction::SetTrue)
                    .help("Overwrite existing analyses"))
                .arg(Arg::new("concurrency").long("concurrency").value_name("N")
                    .help("Analyze worker count (default 5)"))
                .arg(Arg::new("case-type").long("case-type").value_name("TYPE")
                    .value_parser(["generic", "workplace", "employment", "contract"])
                    .help("Executive summary flavor (default generic)"))
                .arg(Arg::new("format").long("format").value_name("FORMAT")
                    .value_parser(["zip", "directory"])
                    .help("Package format (default zip)"))
                .arg(Arg::new("include-raw").long("include-raw").action(ArgAction::SetTrue)
                    .help("Copy originals into the deliverable"))
                .arg(Arg::new("ai-resolve").long("ai-resolve").action(ArgAction::SetTrue)
                    .help("Enable AI entity resolution for single-occurrence people")),
        )
        .subcommand(
            Command::new("ingest")
                .about("Ingest files into the store")
                .arg(Arg::new("dir").long("dir").value_name("DIR").required(true))
                .arg(Arg::new("case").long("case").value_name("CASE_ID")),
        )
        .subcommand(
            Command::new("analyze")
                .about("Analyze every artifact in a case")
                .arg(Arg::new("case").long("case").value_name("CASE_ID").required(true))
                .arg(Arg::new("force").long("force").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("correlate")
                .about("Run cross-evidence correlation for a case and print the result")
                .arg(Arg::new("case").long("case").value_name("CASE_ID").required(true))
                .arg(Arg::new("ai-resolve").long("ai-resolve").action(ArgAction::SetTrue)
                    .help("Enable AI entity resolution for single-occurrence people")),
        )
        .subcommand(
            Command::new("summarize")
                .about("Generate the case summary JSON on stdout")
                .arg(Arg::new("case").long("case").value_name("CASE_ID").required(true))
                .arg(Arg::new("case-type").long("case-type").value_name("TYPE")
                    .value_parser(["generic", "workplace", "employment", "contract"])),
        )
        .subcommand(
            Command::new("package")
                .about("Build the client deliverable for a case")
                .arg(Arg::new("case").long("case").value_name("CASE_ID").required(true))
                .arg(Arg::new("format").long("format").value_name("FORMAT")
                    .value_parser(["zip", "directory"]))
                .arg(Arg::new("include-raw").long("include-raw").action(ArgAction::SetTrue)),
        )
        .subcommand(Command::new("stats").about("Print store statistics"))
        .subcommand(
            Command::new("cleanup")
                .about("Remove broken case links and report orphans (dry run by default)")
                .arg(Arg::new("force").long("force").action(ArgAction::SetTrue)
                    .help("Actually remove; without this flag nothing is deleted")),
        )
        .subcommand(
            Command::new("prune")
                .about("Remove a case and any artifacts it alone references (dry run by default)")
                .arg(Arg::new("case").long("case").value_name("CASE_ID").required(true))
                .arg(Arg::new("force").long("force").action(ArgAction::SetTrue)
                    .help("Actually remove; without this flag nothing is deleted")),
        )
        .get_matches();

    let exit = match run(&matches) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("❌ {}", e);
            exit_for_error(&e)
        }
    };
    std::process::exit(exit.code());
}

fn run(matches: &ArgMatches) -> PipelineResult<ExitStatus> {
    let storage_root = matches
        .get_one::<String>("storage-root")
        .map(PathBuf::from)
        .or_else(|| std::env::var("CASECORPUS_STORAGE_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("evidence-store"));
    let verbose = matches.get_flag("verbose");
    let logger = Logger::new(verbose);

    match matches.subcommand() {
        Some(("process-case", sub)) => cmd_process_case(sub, storage_root, &logger),
        Some(("ingest", sub)) => cmd_ingest(sub, storage_root, &logger),
        Some(("analyze", sub)) => cmd_analyze(sub, storage_root, &logger),
        Some(("correlate", sub)) => cmd_correlate(sub, storage_root, &logger),
        Some(("summarize", sub)) => cmd_summarize(sub, storage_root, &logger),
        Some(("package", sub)) => cmd_package(sub, storage_root, &logger),
        Some(("stats", _)) => cmd_stats(storage_root),
        Some(("cleanup", sub)) => cmd_cleanup(sub, storage_root),
        Some(("prune", sub)) => cmd_prune(sub, storage_root),
        _ => Err(PipelineError::config("no subcommand given (see --help)")),
    }
}

fn build_config(sub: &ArgMatches, storage_root: PathBuf) -> PipelineResult<Config> {
    let mut config = Config::from_env(storage_root);
    if let Ok(Some(concurrency)) = sub.try_get_one::<String>("concurrency") {
        config.analyze.max_concurrency = concurrency
            .parse()
            .map_err(|_| PipelineError::config("concurrency must be a positive integer"))?;
    }
    if let Ok(Some(case_type)) = sub.try_get_one::<String>("case-type") {
        config.summary.case_type = CaseType::parse(case_type)?;
    }
    if let Ok(Some(format)) = sub.try_get_one::<String>("format") {
        config.package.format = PackageFormat::parse(format)?;
    }
    if sub.try_get_one::<bool>("include-raw").ok().flatten() == Some(&true) {
        config.package.include_raw = true;
    }
    if sub.try_get_one::<bool>("force").ok().flatten() == Some(&true) {
        config.analyze.force = true;
    }
    if sub.try_get_one::<bool>("ai-resolve").ok().flatten() == Some(&true) {
        config.correlate.ai_resolve = true;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_process_case(
    sub: &ArgMatches,
    storage_root: PathBuf,
    logger: &Logger,
) -> PipelineResult<ExitStatus> {
    let dir = PathBuf::from(sub.get_one::<String>("dir").unwrap());
    let case_id = sub.get_one::<String>("case").unwrap();
    let config = build_config(sub, storage_root)?;

    let store = EvidenceStore::open(&config.storage_root)?;
    let provider = provider_from_env()?;
    let client = LlmClient::new(provider, &config.llm);
    let reader = DefaultReader::new();
    let progress = ConsoleProgress;
    let cancel = CancellationToken::new();

    let pipeline = Pipeline::new(&store, &config, &client, &reader, logger, &progress, cancel);
    let report = pipeline.process_case(&dir, case_id)?;

    let analyzed = report
        .items
        .iter()
        .filter(|i| i.state == casecorpus::pipeline::ItemState::Analyzed)
        .count();
    let failed = report
        .items
        .iter()
        .filter(|i| matches!(i.state, casecorpus::pipeline::ItemState::Failed(_)))
        .count();

    println!(
        "✅ Case {} processed: {} items, {} analyzed, {} failed",
        report.case_id,
        report.items.len(),
        analyzed,
        failed
    );
    if let Some(path) = &report.package_path {
        println!("📦 Deliverable: {}", path.display());
    }
    if failed > 0 {
        println!("⚠️ {} artifact(s) failed; see logs", failed);
    }
    Ok(report.exit)
}

fn cmd_ingest(sub: &ArgMatches, storage_root: PathBuf, logger: &Logger) -> PipelineResult<ExitStatus> {
    let dir = PathBuf::from(sub.get_one::<String>("dir").unwrap());
    let case_id = sub.get_one::<String>("case").map(|s| s.as_str());

    let store = EvidenceStore::open(&storage_root)?;
    let cancel = CancellationToken::new();
    let files = Pipeline::enumerate_files(&dir);
    let mut ingested = 0usize;
    let mut duplicates = 0usize;
    let mut failures = 0usize;

    for path in files {
        match store.ingest(&path, case_id, "cli", &cancel) {
            Ok(result) => {
                println!(
                    "📥 {} {} ({})",
                    match result.status {
                        casecorpus::types::IngestStatus::Ingested => "Ingested",
                        casecorpus::types::IngestStatus::Duplicate => "Duplicate",
                    },
                    result.metadata.filename,
                    casecorpus::types::short_sha(&result.sha256)
                );
                match result.status {
                    casecorpus::types::IngestStatus::Ingested => ingested += 1,
                    casecorpus::types::IngestStatus::Duplicate => duplicates += 1,
                }
            }
            Err(e) => {
                logger.error(&format!("Ingest failed for {}: {}", path.display(), e));
                eprintln!("❌ {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    println!(
        "✅ Ingest complete: {} new, {} duplicates, {} failures",
        ingested, duplicates, failures
    );
    Ok(if failures > 0 {
        ExitStatus::PartialFailure
    } else {
        ExitStatus::Success
    })
}

fn cmd_analyze(sub: &ArgMatches, storage_root: PathBuf, logger: &Logger) -> PipelineResult<ExitStatus> {
    let case_id = sub.get_one::<String>("case").unwrap();
    let force = sub.get_flag("force");

    let mut config = Config::from_env(storage_root);
    config.analyze.force = force;
    config.validate()?;

    let store = EvidenceStore::open(&config.storage_root)?;
    let provider = provider_from_env()?;
    let client = LlmClient::new(provider, &config.llm);
    let reader = DefaultReader::new();
    let cancel = CancellationToken::new();

    let shas = store.list_case(case_id)?;
    let mut analyzed = 0usize;
    let mut failed = 0usize;
    let dispatch = AnalyzerDispatch::new(&store, &client, &reader, "cli-analyst");

    for sha in &shas {
        let metadata = store.load_metadata(sha)?;
        let evidence_type = casecorpus::detect::detect_evidence_type(&metadata.extension, None);
        if !evidence_type.is_analyzable() {
            println!("⚠️ Skipping {} (type other)", casecorpus::types::short_sha(sha));
            continue;
        }
        match dispatch.analyze(sha, force, Some(case_id), None, &cancel) {
            Ok(analysis) => {
                println!(
                    "🔍 Analyzed {} ({}) labels: {}",
                    metadata.filename,
                    casecorpus::types::short_sha(sha),
                    analysis.labels.join(", ")
                );
                analyzed += 1;
            }
            Err(e) => {
                logger.error(&format!("Analysis failed for {}: {}", sha, e));
                eprintln!("❌ {} failed: {}", casecorpus::types::short_sha(sha), e);
                failed += 1;
            }
        }
    }

    println!("✅ Analysis complete: {} analyzed, {} failed", analyzed, failed);
    Ok(if failed > 0 && analyzed == 0 {
        ExitStatus::AllAnalysesFailed
    } else if failed > 0 {
        ExitStatus::PartialFailure
    } else {
        ExitStatus::Success
    })
}

fn cmd_correlate(
    sub: &ArgMatches,
    storage_root: PathBuf,
    _logger: &Logger,
) -> PipelineResult<ExitStatus> {
    let case_id = sub.get_one::<String>("case").unwrap();
    let config = build_config(sub, storage_root)?;

    let store = EvidenceStore::open(&config.storage_root)?;
    let cancel = CancellationToken::new();

    let shas = store.list_case(case_id)?;
    let mut analyses = Vec::new();
    let mut metadata = std::collections::HashMap::new();
    for sha in &shas {
        let meta = store.load_metadata(sha)?;
        if let Some(analysis) = store.load_analysis(sha)? {
            analyses.push(analysis);
        }
        metadata.insert(sha.clone(), meta);
    }

    println!(
        "🔗 Correlating case {} ({} analyses across {} evidence items)",
        case_id,
        analyses.len(),
        shas.len()
    );

    // The model is only needed for the optional AI resolution pass.
    let client;
    let client_ref = if config.correlate.ai_resolve {
        let provider = provider_from_env()?;
        client = LlmClient::new(provider, &config.llm);
        Some(&client)
    } else {
        None
    };
    let engine = CorrelationEngine::new(&config.correlate, client_ref);
    let correlation = engine.correlate(case_id, &analyses, &metadata, &cancel)?;

    let json = serde_json::to_string_pretty(&correlation)
        .map_err(|e| PipelineError::correlation(&format!("serialize correlation: {}", e)))?;
    println!("{}", json);
    Ok(ExitStatus::Success)
}

fn cmd_summarize(
    sub: &ArgMatches,
    storage_root: PathBuf,
    _logger: &Logger,
) -> PipelineResult<ExitStatus> {
    let case_id = sub.get_one::<String>("case").unwrap();
    let config = build_config(sub, storage_root)?;

    let store = EvidenceStore::open(&config.storage_root)?;
    let provider = provider_from_env()?;
    let client = LlmClient::new(provider, &config.llm);
    let cancel = CancellationToken::new();

    println!("🔗 Correlating and summarizing case {}", case_id);
    let generator = SummaryGenerator::new(&store, &client, &config);
    let summary = generator.generate_case_summary(case_id, true, &cancel)?;

    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| PipelineError::correlation(&format!("serialize summary: {}", e)))?;
    println!("{}", json);
    Ok(ExitStatus::Success)
}

fn cmd_package(sub: &ArgMatches, storage_root: PathBuf, logger: &Logger) -> PipelineResult<ExitStatus> {
    let case_id = sub.get_one::<String>("case").unwrap();
    let config = build_config(sub, storage_root)?;

    let store = EvidenceStore::open(&config.storage_root)?;
    let provider = provider_from_env()?;
    let client = LlmClient::new(provider, &config.llm);
    let cancel = CancellationToken::new();

    println!("🔗 Summarizing case {}", case_id);
    let generator = SummaryGenerator::new(&store, &client, &config);
    let summary = generator.generate_case_summary(case_id, true, &cancel)?;

    println!("📦 Building deliverable for case {}", case_id);
    let builder = PackageBuilder::new(&store, &config, logger);
    let result = builder.build(&summary, &cancel)?;

    println!("✅ Package created: {}", result.path.display());
    for report in &result.reports {
        println!("   - {}", report.filename);
    }
    Ok(ExitStatus::Success)
}

fn cmd_stats(storage_root: PathBuf) -> PipelineResult<ExitStatus> {
    let store = EvidenceStore::open(&storage_root)?;
    let stats = store.stats()?;

    println!("📊 Store statistics");
    println!("   Evidence items: {}", stats.evidence_count);
    println!("   Total bytes: {}", stats.total_bytes);
    println!("   Cases: {}", stats.case_count);
    println!("   Analyzed: {}", stats.analyzed_count);
    println!("   Unanalyzed: {}", stats.unanalyzed_count);
    println!("   Orphans: {}", stats.orphan_count);
    for (kind, count) in &stats.by_type {
        println!("   {}: {}", kind, count);
    }
    Ok(ExitStatus::Success)
}

fn cmd_cleanup(sub: &ArgMatches, storage_root: PathBuf) -> PipelineResult<ExitStatus> {
    let dry_run = !sub.get_flag("force");
    let store = EvidenceStore::open(&storage_root)?;
    let report = store.cleanup(dry_run)?;

    if dry_run {
        println!("⚠️ Dry run: nothing was deleted (pass --force to apply)");
    }
    println!(
        "✅ Cleanup: {} broken links, {} empty case dirs, {} orphans",
        report.broken_links_removed.len(),
        report.empty_dirs_removed.len(),
        report.orphans.len()
    );
    for orphan in &report.orphans {
        println!("   orphan: {}", casecorpus::types::short_sha(orphan));
    }
    Ok(ExitStatus::Success)
}

fn cmd_prune(sub: &ArgMatches, storage_root: PathBuf) -> PipelineResult<ExitStatus> {
    let case_id = sub.get_one::<String>("case").unwrap();
    let dry_run = !sub.get_flag("force");
    let store = EvidenceStore::open(&storage_root)?;
    let report = store.prune_case(case_id, dry_run)?;

    if dry_run {
        println!("⚠️ Dry run: nothing was deleted (pass --force to apply)");
    }
    println!(
        "✅ Prune {}: {} artifacts removed, {} unlinked only (shared with other cases)",
        case_id,
        report.removed.len(),
        report.unlinked_only.len()
    );
    Ok(ExitStatus::Success)
}
