use anyhow::Result;
use regex::Regex;

/// Strategy that decides when a command has finished producing output.
///
/// The tracker consults the detector on every appended chunk; a `true`
/// verdict triggers the same completion path as an explicit
/// `complete_command` call. The timeout sweep remains the backstop when no
/// detector fires.
pub trait CompletionDetector: Send + Sync {
    fn is_complete(&self, chunk: &str, accumulated: &str) -> bool;
}

/// Detects completion by matching the shell prompt at the end of output.
pub struct PromptMarkerDetector {
    pattern: Regex,
}

/// Matches common interactive prompts: `$`, `#`, `%` or `>` at end of line.
pub const DEFAULT_PROMPT_PATTERN: &str = r"[$#%>]\s*$";

impl PromptMarkerDetector {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Default for PromptMarkerDetector {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_PROMPT_PATTERN).expect("default prompt pattern is valid"),
        }
    }
}

impl CompletionDetector for PromptMarkerDetector {
    fn is_complete(&self, chunk: &str, accumulated: &str) -> bool {
        // Only a chunk that actually carries the prompt tail can complete
        // the command; scanning the accumulated tail avoids firing on a
        // prompt split across chunks.
        if chunk.trim().is_empty() {
            return false;
        }
        let tail = accumulated
            .rsplit('\n')
            .find(|line| !line.trim().is_empty())
            .unwrap_or("");
        self.pattern.is_match(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_detector_matches_shell_prompts() {
        let det = PromptMarkerDetector::default();
        assert!(det.is_complete("user@host:~$ ", "total 4\nfile.txt\nuser@host:~$ "));
        assert!(det.is_complete("# ", "root prompt\n# "));
        assert!(!det.is_complete("partial output", "partial output"));
    }

    #[test]
    fn empty_chunks_never_complete() {
        let det = PromptMarkerDetector::default();
        assert!(!det.is_complete("", "something$ "));
        assert!(!det.is_complete("  \n", "something$ "));
    }

    #[test]
    fn custom_marker_pattern() {
        let det = PromptMarkerDetector::new(r"DONE\s*$").unwrap();
        assert!(det.is_complete("DONE\n", "output\nDONE\n"));
        assert!(!det.is_complete("user@host$ ", "output\nuser@host$ "));
    }
}
