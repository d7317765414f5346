use crate::model::{ParseContext, ParseOutcome};

/// Common contract every format parser implements (spec.md §4.3). Parsers
/// are a closed, tagged set (Text/Json/Csv) dispatched by priority — no
/// dynamic loading is required.
pub trait LogParser: Send + Sync {
    /// Cheap content sniff: never consumes state, never mutates `ctx`.
    fn can_parse(&self, file_name: &str, sample: &str) -> bool;

    /// Parse a single source line, possibly mutating `ctx` (multi-line
    /// buffering, CSV header tracking).
    fn parse_line(&self, line: &str, line_number: u64, ctx: &mut ParseContext) -> ParseOutcome;

    /// Must be called between files — clears any per-file state the
    /// parser stashed on itself (as opposed to `ctx`, which the caller
    /// resets). Stateless parsers are a no-op.
    fn reset(&self);

    fn supported_format(&self) -> &'static str;

    fn priority(&self) -> i32;

    fn supports_multi_line(&self) -> bool {
        false
    }

    /// Emit any residual buffered entry at EOF (only meaningful for
    /// multi-line parsers). Default: nothing buffered.
    fn flush_pending(&self, _ctx: &mut ParseContext) -> Option<ParseOutcome> {
        None
    }

    fn description(&self) -> &'static str;
}
