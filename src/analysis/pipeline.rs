//! One analysis run, from module batches to a shared oracle.
//!
//! Phases: normalize (parallel, one task per module) → aggregate → build the
//! call graph → collect accesses → propagate → finalize. Aggregation and call
//! graph building are serialized; everything after them only reads the graph.

use crate::analysis::access::AccessCollector;
use crate::analysis::aggregation::Program;
use crate::analysis::call_graph::CallGraphBuilder;
use crate::analysis::oracle::DirectionOracle;
use crate::analysis::propagation::DirectionPropagator;
use crate::config::DirmapConfig;
use crate::core::{FactStream, ModuleFacts};
use crate::errors::{AnalysisError, Result};
use crate::observability::{set_phase, AnalysisPhase};
use std::sync::Arc;
use tracing::{debug_span, warn};

/// Collects module facts, then runs the analysis until it succeeds once.
///
/// A fatal error leaves the batches in place: the session keeps accepting
/// batches and a later `run` analyzes them again.
#[derive(Debug)]
pub struct AnalysisSession {
    config: DirmapConfig,
    stream: FactStream,
    result: Option<Arc<DirectionOracle>>,
}

impl AnalysisSession {
    pub fn new(config: DirmapConfig) -> Self {
        if let Err(message) = config.analysis.validate() {
            warn!(error = %message, "Invalid analysis settings, using defaults");
        }
        Self {
            config,
            stream: FactStream::new(),
            result: None,
        }
    }

    pub fn config(&self) -> &DirmapConfig {
        &self.config
    }

    /// Add one module batch. Fails once a run has succeeded.
    pub fn ingest(&mut self, facts: ModuleFacts) -> Result<()> {
        if self.result.is_some() {
            return Err(AnalysisError::finalized(format!(
                "ingest module `{}` after the analysis ran",
                facts.module
            )));
        }
        self.stream.push(facts)
    }

    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    /// Run the analysis, or return the oracle of the previous run
    pub fn run(&mut self) -> Result<Arc<DirectionOracle>> {
        if let Some(oracle) = &self.result {
            return Ok(Arc::clone(oracle));
        }

        let oracle = Arc::new(self.execute()?);
        self.stream.seal();
        self.result = Some(Arc::clone(&oracle));
        Ok(oracle)
    }

    fn execute(&self) -> Result<DirectionOracle> {
        let mut settings = self.config.analysis.clone();
        if settings.validate().is_err() {
            settings = Default::default();
        }
        let parallel = &self.config.parallel;

        let closed = {
            let _span = debug_span!("normalize", modules = self.stream.len()).entered();
            let _phase = set_phase(AnalysisPhase::Normalization);
            self.stream.snapshot(parallel)?
        };

        let program = {
            let _span = debug_span!("aggregate", modules = closed.modules.len()).entered();
            let _phase = set_phase(AnalysisPhase::Aggregation);
            Program::aggregate(closed)?
        };

        let build = {
            let _span = debug_span!("build_call_graph", sites = program.call_sites.len()).entered();
            let _phase = set_phase(AnalysisPhase::CallGraphBuilding);
            CallGraphBuilder::new(&program, &settings).build()?
        };
        for diagnostic in &build.diagnostics {
            log::debug!("Unresolved call site {}: {}", diagnostic.site, diagnostic.message);
        }

        let locals = {
            let _span =
                debug_span!("collect_accesses", accesses = program.accesses.len()).entered();
            let _phase = set_phase(AnalysisPhase::AccessCollection);
            AccessCollector::new(&program, settings.scoped_lookup).collect()
        };

        let propagation = {
            let _span = debug_span!("propagate", edges = build.graph.edge_count()).entered();
            let _phase = set_phase(AnalysisPhase::Propagation);
            DirectionPropagator::new(&build.graph, &settings, parallel).propagate(&locals)?
        };

        let _span = debug_span!("finalize").entered();
        let _phase = set_phase(AnalysisPhase::Finalization);
        let oracle = DirectionOracle::finalize(program, build, locals, propagation);
        log::info!(
            "Classified {} symbols ({} unresolved call sites, {} relaxations)",
            oracle.classification().len(),
            oracle.unresolved_diagnostics().len(),
            oracle.stats().relaxations
        );
        Ok(oracle)
    }
}

/// Analyze a complete set of module batches in one call
pub fn analyze(
    config: DirmapConfig,
    batches: impl IntoIterator<Item = ModuleFacts>,
) -> Result<Arc<DirectionOracle>> {
    let mut session = AnalysisSession::new(config);
    for batch in batches {
        session.ingest(batch)?;
    }
    session.run()
}
