//! Player script slicing: parse, analyze, match and assemble

pub mod analyzer;
pub mod assembler;
pub mod builtins;
pub mod extraction;
pub mod matchers;
pub mod safety;
pub mod scope;
pub mod source;

#[cfg(test)]
pub(crate) mod fixtures;

pub use assembler::{AssemblyOptions, GeneratedScript, ScriptAssembler};
pub use extraction::{
    default_targets, ExtractionCoordinator, ExtractionReport, ExtractionTarget, TargetStatus,
    N_FUNCTION_NAME, SIG_FUNCTION_NAME, TIMESTAMP_VAR_NAME,
};
pub use matchers::{Matcher, NTransformMatcher, PropertyMatcher, SignatureMatcher};
pub use safety::SafetyMode;
pub use source::SourceModel;

use crate::Result;
use oxc_allocator::Allocator;
use tracing::info;

/// Run one full pass over `text` and assemble whatever became ready
pub fn slice_player(
    text: &str,
    targets: Vec<ExtractionTarget>,
    options: &AssemblyOptions,
) -> Result<(GeneratedScript, ExtractionReport)> {
    let allocator = Allocator::default();
    let model = SourceModel::parse(&allocator, text)?;
    let analysis = ExtractionCoordinator::new(targets).run(&model);
    let script = ScriptAssembler::new(&analysis, options.clone()).assemble()?;

    info!(
        "Sliced player: {} of {} statements scanned, {} declarations",
        analysis.report.statements_scanned,
        analysis.report.statements_total,
        analysis.report.declarations
    );
    Ok((script, analysis.report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SliceError;
    use fixtures::PLAYER;

    #[test]
    fn test_slice_player() {
        let (script, report) =
            slice_player(PLAYER, default_targets(), &AssemblyOptions::default()).unwrap();

        assert!(report.all_ready());
        assert!(script.exports(SIG_FUNCTION_NAME));
        assert!(script.exports(N_FUNCTION_NAME));
        assert_eq!(script.raw_value(TIMESTAMP_VAR_NAME), Some("20123"));
    }

    #[test]
    fn test_slice_player_parse_error() {
        let err = slice_player("var = ;", default_targets(), &AssemblyOptions::default())
            .unwrap_err();
        assert!(matches!(err, SliceError::Parse { .. }));
    }
}
