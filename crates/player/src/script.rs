//! Frame-by-frame rendering of a folder through a G'MIC script.
//!
//! Every numbered image in the input folder is passed to the `gmic` tool
//! together with the user's script, and the result lands in the output
//! folder as `<prefix>_<NNN>.png`. The first frame's tool output is kept
//! in a log file so the caller can show it as a preview of what the
//! script does.

use std::cmp::Ordering as CmpOrdering;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clipframe_common::config::{AppConfig, FrameOrder};
use clipframe_common::error::{ClipframeError, ClipframeResult};
use regex::Regex;

/// Shared flag that stops a script render between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to render.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    /// G'MIC commands applied to each frame, e.g. `-blur 3 -sharpen 100`.
    pub user_script: String,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    /// Prefix of output file names.
    pub frame_name: String,
}

/// The first frame's tool run, handed to the output callback.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub input: PathBuf,
    pub output: PathBuf,
    pub success: bool,
    /// `None` when the tool was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr of the tool.
    pub log: String,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFailure {
    pub input: PathBuf,
    pub exit_code: Option<i32>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ScriptRenderSummary {
    /// Frames the tool was run on, failed ones included.
    pub processed: usize,
    /// Files without a frame number in their name.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FrameFailure>,
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// An input file and the output number derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFrame {
    pub input: PathBuf,
    pub number: String,
}

pub struct ScriptRenderer {
    job: ScriptJob,
    gmic: PathBuf,
    log_path: PathBuf,
    order: FrameOrder,
    number_width: usize,
    cancel: CancelToken,
}

impl ScriptRenderer {
    pub fn new(job: ScriptJob, config: &AppConfig) -> Self {
        Self {
            job,
            gmic: config.tools.gmic.clone(),
            log_path: config.script_log_path(),
            order: config.script.frame_order,
            number_width: config.script.number_width,
            cancel: CancelToken::new(),
        }
    }

    pub fn job(&self) -> &ScriptJob {
        &self.job
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The frames a render would visit, in order, plus the files skipped
    /// for having no number in their name.
    pub fn plan(&self) -> ClipframeResult<(Vec<PlannedFrame>, Vec<PathBuf>)> {
        plan_frames(&self.job.input_folder, self.order, self.number_width)
    }

    /// Run the script over every planned frame.
    ///
    /// `progress` gets the 1-based count of frames processed after each
    /// one; `output` gets the first frame's tool output. Cancellation is
    /// checked before each frame and leaves already written frames in
    /// place.
    pub fn write_frames(
        &self,
        mut progress: impl FnMut(usize),
        mut output: impl FnMut(&ScriptOutput),
    ) -> ClipframeResult<ScriptRenderSummary> {
        let script_args = split_script(&self.job.user_script)?;
        let (frames, skipped) = self.plan()?;
        std::fs::create_dir_all(&self.job.output_folder)?;

        let started_at = Utc::now();
        let started = Instant::now();
        let mut failed = Vec::new();
        let mut processed = 0usize;
        let mut aborted = false;

        tracing::info!(
            input = %self.job.input_folder.display(),
            output = %self.job.output_folder.display(),
            frames = frames.len(),
            skipped = skipped.len(),
            "Script render started"
        );

        for frame in &frames {
            if self.cancel.is_cancelled() {
                aborted = true;
                tracing::info!(processed, "Script render aborted");
                break;
            }

            let target = self
                .job
                .output_folder
                .join(format!("{}_{}.png", self.job.frame_name, frame.number));
            let mut command = Command::new(&self.gmic);
            command
                .arg(&frame.input)
                .args(&script_args)
                .arg("-output")
                .arg(&target)
                .stdin(Stdio::null());

            if processed == 0 {
                let preview = self.run_logged(&mut command, frame, &target)?;
                if !preview.success {
                    failed.push(FrameFailure {
                        input: frame.input.clone(),
                        exit_code: preview.exit_code,
                        reason: "gmic exited with failure".to_string(),
                    });
                }
                output(&preview);
            } else {
                command.stdout(Stdio::null()).stderr(Stdio::null());
                if let Some(failure) = run_quiet(&mut command, frame) {
                    failed.push(failure);
                }
            }

            processed += 1;
            progress(processed);
        }

        let elapsed = started.elapsed();
        if !aborted {
            tracing::info!(
                processed,
                failed = failed.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Script render finished"
            );
        }

        Ok(ScriptRenderSummary {
            processed,
            skipped,
            failed,
            aborted,
            started_at,
            elapsed,
        })
    }

    /// Run the first frame with its output captured in the preview log.
    fn run_logged(
        &self,
        command: &mut Command,
        frame: &PlannedFrame,
        target: &Path,
    ) -> ClipframeResult<ScriptOutput> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log = File::create(&self.log_path)?;
        command.stdout(log.try_clone()?).stderr(log);

        let status = command.status().map_err(|e| {
            ClipframeError::script(format!("Failed to start {}: {e}", self.gmic.display()))
        })?;
        let text = std::fs::read(&self.log_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        tracing::debug!(
            input = %frame.input.display(),
            status = %status,
            log = %self.log_path.display(),
            "First frame rendered"
        );

        Ok(ScriptOutput {
            input: frame.input.clone(),
            output: target.to_path_buf(),
            success: status.success(),
            exit_code: status.code(),
            log: text,
            log_path: self.log_path.clone(),
        })
    }
}

fn run_quiet(command: &mut Command, frame: &PlannedFrame) -> Option<FrameFailure> {
    match command.status() {
        Ok(status) if status.success() => None,
        Ok(status) => {
            tracing::warn!(input = %frame.input.display(), status = %status, "gmic failed on frame");
            Some(failure_from_status(frame, status))
        }
        Err(e) => {
            tracing::warn!(input = %frame.input.display(), error = %e, "Failed to start gmic");
            Some(FrameFailure {
                input: frame.input.clone(),
                exit_code: None,
                reason: format!("failed to start: {e}"),
            })
        }
    }
}

fn failure_from_status(frame: &PlannedFrame, status: ExitStatus) -> FrameFailure {
    FrameFailure {
        input: frame.input.clone(),
        exit_code: status.code(),
        reason: format!("gmic exited with {status}"),
    }
}

fn digits_regex() -> ClipframeResult<&'static Regex> {
    static DIGITS: OnceLock<Result<Regex, String>> = OnceLock::new();
    match DIGITS.get_or_init(|| Regex::new(r"[0-9]+").map_err(|e| e.to_string())) {
        Ok(re) => Ok(re),
        Err(e) => Err(ClipframeError::script(format!("Regex error: {e}"))),
    }
}

/// First run of ASCII digits in `file_name`.
pub fn frame_number(file_name: &str) -> ClipframeResult<Option<&str>> {
    Ok(digits_regex()?.find(file_name).map(|m| m.as_str()))
}

/// Left-pad `digits` with zeros to `width`; longer input is kept whole.
pub fn zero_fill(digits: &str, width: usize) -> String {
    format!("{digits:0>width$}")
}

/// Compare two digit strings by numeric value without parsing them.
fn compare_numbers(a: &str, b: &str) -> CmpOrdering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// List the regular files of `folder` and derive each one's output number.
pub fn plan_frames(
    folder: &Path,
    order: FrameOrder,
    number_width: usize,
) -> ClipframeResult<(Vec<PlannedFrame>, Vec<PathBuf>)> {
    if !folder.is_dir() {
        return Err(ClipframeError::FileNotFound {
            path: folder.to_path_buf(),
        });
    }

    let mut numbered: Vec<(String, String, PathBuf)> = Vec::new();
    let mut skipped = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        match frame_number(&name)? {
            Some(digits) => numbered.push((digits.to_string(), name, path)),
            None => {
                tracing::warn!(file = %path.display(), "Skipping file without a frame number");
                skipped.push(path);
            }
        }
    }

    if order == FrameOrder::Numeric {
        numbered.sort_by(|a, b| compare_numbers(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));
    }

    let frames = numbered
        .into_iter()
        .map(|(digits, _, input)| PlannedFrame {
            input,
            number: zero_fill(&digits, number_width),
        })
        .collect();
    Ok((frames, skipped))
}

/// Split a script into arguments on whitespace. Single quotes keep their
/// contents literally; double quotes group words and honour `\"` and `\\`;
/// a backslash outside quotes escapes the next character.
pub fn split_script(script: &str) -> ClipframeResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = script.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ClipframeError::script("Unterminated ' in script")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => {
                                return Err(ClipframeError::script("Unterminated \" in script"))
                            }
                        },
                        Some(c) => current.push(c),
                        None => return Err(ClipframeError::script("Unterminated \" in script")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => current.push('\\'),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_number_takes_first_digit_run() {
        assert_eq!(frame_number("clip5.png").unwrap(), Some("5"));
        assert_eq!(frame_number("take2_frame0042.png").unwrap(), Some("2"));
        assert_eq!(frame_number("poster.png").unwrap(), None);
        // Non-ASCII digits do not count.
        assert_eq!(frame_number("frame٣.png").unwrap(), None);
    }

    #[test]
    fn test_zero_fill() {
        assert_eq!(zero_fill("7", 3), "007");
        assert_eq!(zero_fill("42", 3), "042");
        assert_eq!(zero_fill("1234", 3), "1234");
        assert_eq!(zero_fill("007", 3), "007");
    }

    #[test]
    fn test_compare_numbers() {
        assert_eq!(compare_numbers("10", "9"), CmpOrdering::Greater);
        assert_eq!(compare_numbers("007", "7"), CmpOrdering::Equal);
        assert_eq!(compare_numbers("100", "099"), CmpOrdering::Greater);
        assert_eq!(
            compare_numbers("99999999999999999999999", "100000000000000000000000"),
            CmpOrdering::Less
        );
    }

    #[test]
    fn test_split_script() {
        assert_eq!(
            split_script("-blur 3  -sharpen 100").unwrap(),
            vec!["-blur", "3", "-sharpen", "100"]
        );
        assert_eq!(
            split_script(r#"-text "hello world",10,10 -x 'a b'"#).unwrap(),
            vec!["-text", "hello world,10,10", "-x", "a b"]
        );
        assert_eq!(split_script(r"a\ b").unwrap(), vec!["a b"]);
        assert_eq!(split_script(r#""" x"#).unwrap(), vec!["", "x"]);
        assert!(split_script("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_script_rejects_unterminated_quotes() {
        assert!(matches!(
            split_script("-blur 'oops"),
            Err(ClipframeError::Script { .. })
        ));
        assert!(matches!(
            split_script("\"oops"),
            Err(ClipframeError::Script { .. })
        ));
    }

    #[test]
    fn test_plan_sorts_numerically_and_skips_unnumbered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["clip10.png", "clip5.png", "clip100.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub7")).unwrap();

        let (frames, skipped) = plan_frames(dir.path(), FrameOrder::Numeric, 3).unwrap();
        let numbers: Vec<&str> = frames.iter().map(|f| f.number.as_str()).collect();
        assert_eq!(numbers, vec!["005", "010", "100"]);
        assert_eq!(skipped, vec![dir.path().join("notes.txt")]);
    }

    #[test]
    fn test_plan_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            plan_frames(&missing, FrameOrder::Numeric, 3),
            Err(ClipframeError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    proptest! {
        #[test]
        fn prop_zero_fill_pads_without_truncating(n in 0u64..10_000_000, width in 1usize..8) {
            let digits = n.to_string();
            let filled = zero_fill(&digits, width);
            prop_assert_eq!(filled.len(), digits.len().max(width));
            prop_assert!(filled.ends_with(&digits));
            prop_assert_eq!(filled.trim_start_matches('0').parse::<u64>().unwrap_or(0), n);
        }
    }
}
