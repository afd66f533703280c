use crate::record::Record;
use crate::sink::CsvSink;

/// Whether readings are being persisted. Starts Idle; one-way - once
/// Recording there is no transition back, logging runs until process exit.
pub enum SessionState {
    Idle,
    Recording,
}

impl SessionState {
    pub fn new() -> SessionState {
        SessionState::Idle
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Apply the arming rule to one trimmed operator command. Returns true
    /// iff this call performed the Idle -> Recording transition.
    ///
    /// The rule is a substring test: any command containing an 's' arms
    /// logging. Note that this matches more than the intended "start" - a
    /// "status" or even "stop" arms it too. Matches the scale's companion
    /// tooling; an exact-match rule would change behaviour operators rely on.
    pub fn observe_command(&mut self, command: &str) -> bool {
        if self.is_recording() {
            return false;
        }
        if command.contains('s') {
            *self = SessionState::Recording;
            return true;
        }
        false
    }
}

/// What became of one incoming line.
#[derive(Debug)]
pub enum LineDisposition {
    /// Parsed and echoed only - the session is not recording.
    Observed,
    /// Appended to the sink.
    Recorded,
    /// The session is recording but the append failed.
    SinkFailed(std::io::Error),
}

/// Result of handling one line of operator input.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The trimmed text, to be forwarded to the device verbatim.
    pub command: String,
    /// True iff this input armed logging.
    pub started_logging: bool,
}

/// The ingestion pipeline: session gate plus sink, driven line-by-line.
///
/// Owned and driven by the session thread; nothing here blocks on anything
/// other than the (local, append-mode) sink write. Kept free of channels and
/// threads so the gate can be exercised directly in tests.
pub struct LogSession {
    state: SessionState,
    sink: CsvSink,
}

impl LogSession {
    pub fn new(sink: CsvSink) -> LogSession {
        LogSession {
            state: SessionState::new(),
            sink,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Handle one line from the device: parse it, and append it to the sink
    /// iff the session is recording. The record is returned either way so
    /// the operator console can echo readings that were not persisted.
    pub fn handle_line(&mut self, line: &str) -> (Record, LineDisposition) {
        let record = Record::from_line(line);
        let disposition = if self.state.is_recording() {
            match self.sink.append(&record) {
                Ok(()) => LineDisposition::Recorded,
                Err(e) => LineDisposition::SinkFailed(e),
            }
        } else {
            LineDisposition::Observed
        };
        (record, disposition)
    }

    /// Handle one line of operator input: trim it, apply the arming rule,
    /// and hand back the text to forward. The same text doubles as arming
    /// signal and device command - it is forwarded regardless of whether it
    /// armed logging.
    pub fn handle_command(&mut self, input: &str) -> CommandOutcome {
        let command = input.trim();
        let started_logging = self.state.observe_command(command);
        CommandOutcome {
            command: command.to_string(),
            started_logging,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_csv_path(tag: &str) -> PathBuf {
        let unique = format!(
            "scalelog_session_{}_{}_{}.csv",
            tag,
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        std::env::temp_dir().join(unique)
    }

    fn session(tag: &str) -> (LogSession, PathBuf) {
        let path = temp_csv_path(tag);
        (LogSession::new(CsvSink::create(path.clone())), path)
    }

    #[test]
    fn test_commands_with_s_arm_recording() {
        for command in ["s", "start", "stop", "status", "weigh stuff", "S s"] {
            let mut state = SessionState::new();
            // "stop" arming the gate is intentional - see observe_command.
            let fired = state.observe_command(command);
            assert!(fired, "command {command:?} must arm recording");
            assert!(state.is_recording());
        }
    }

    #[test]
    fn test_commands_without_s_leave_idle() {
        let mut state = SessionState::new();
        for command in ["", "tare", "T", "zero", "99", "S"] {
            // Note: the test is case sensitive by design, capital 'S' alone
            // does not arm.
            assert!(!state.observe_command(command));
            assert!(!state.is_recording(), "command {command:?} must not arm");
        }
    }

    #[test]
    fn test_recording_is_permanent() {
        let mut state = SessionState::new();
        assert!(state.observe_command("start"));
        for command in ["stop", "", "tare", "anything at all"] {
            assert!(
                !state.observe_command(command),
                "the transition must only fire once"
            );
            assert!(state.is_recording(), "no command may disarm recording");
        }
    }

    #[test]
    fn test_idle_lines_are_observed_not_recorded() {
        let (mut session, path) = session("idle");
        let (record, disposition) = session.handle_line("1,2,3,4");
        assert_eq!(record.fields(), ["1", "2", "3", "4"]);
        assert!(matches!(disposition, LineDisposition::Observed));
        assert!(!path.exists(), "idle lines must not create the file");
    }

    #[test]
    fn test_recorded_lines_reach_the_sink_in_order() {
        let (mut session, path) = session("recording");
        session.handle_command("start");
        for line in ["1,2,3,4", "5,6,7,8\r", " 9,10,11,12 "] {
            let (_, disposition) = session.handle_line(line);
            assert!(matches!(disposition, LineDisposition::Recorded));
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "time_since_tare,raw,raw_weight,raw_error\n\
             1,2,3,4\n5,6,7,8\n9,10,11,12\n"
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_lines_before_arming_are_lost() {
        let (mut session, path) = session("late");
        session.handle_line("1,2,3,4");
        session.handle_command("s");
        session.handle_line("5,6,7,8");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(
            !contents.contains("1,2,3,4"),
            "lines seen while idle must not be backfilled"
        );
        assert!(contents.contains("5,6,7,8"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_command_outcome_carries_trimmed_text() {
        let (mut session, _path) = session("trim");
        assert_eq!(
            session.handle_command("  tare \r\n"),
            CommandOutcome {
                command: "tare".to_string(),
                started_logging: false,
            }
        );
        assert_eq!(
            session.handle_command(" start "),
            CommandOutcome {
                command: "start".to_string(),
                started_logging: true,
            }
        );
        // Already recording: same text, but no second transition.
        assert_eq!(
            session.handle_command("start"),
            CommandOutcome {
                command: "start".to_string(),
                started_logging: false,
            }
        );
    }

    #[test]
    fn test_short_lines_record_with_empty_fields() {
        let (mut session, path) = session("short");
        session.handle_command("s");
        let (record, disposition) = session.handle_line("1,2");
        assert_eq!(record.fields(), ["1", "2", "", ""]);
        assert!(matches!(disposition, LineDisposition::Recorded));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("1,2,,\n"));
        std::fs::remove_file(&path).unwrap();
    }
}
