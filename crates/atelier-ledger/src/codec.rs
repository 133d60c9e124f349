//! Ledger codec - deterministic rendering and tolerant parsing
//!
//! Field order within the header and within each task record is fixed, and
//! optional fields are omitted entirely when absent, so identical session
//! state renders to byte-identical text. Timestamps are RFC 3339 with fixed
//! nanosecond precision, so a parsed ledger reproduces them exactly.

use atelier_core::{CeremonySession, CeremonyStatus, Priority, Task, TaskStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Ceremony header fields recovered from a ledger
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerMetadata {
    pub ceremony_id: String,
    pub name: String,
    pub initiator: String,
    pub intention: String,
    pub status: CeremonyStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of parsing a ledger document
///
/// `metadata` is `None` when the header could not be recovered; `tasks` holds
/// every record that could be fully read, in document order.
#[derive(Debug, Clone, Default)]
pub struct ParsedLedger {
    pub metadata: Option<LedgerMetadata>,
    pub tasks: Vec<Task>,
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a session to ledger text
pub fn render(session: &CeremonySession) -> String {
    let mut out = String::new();

    out.push_str("# Ceremony Ledger\n\n");
    out.push_str(&format!("- Ceremony-Id: {}\n", session.ceremony_id));
    out.push_str(&format!("- Name: {}\n", session.name));
    out.push_str(&format!("- Initiator: {}\n", session.initiator));
    out.push_str(&format!("- Status: {}\n", session.status));
    out.push_str(&format!("- Created-At: {}\n", format_ts(&session.created_at)));
    if let Some(ts) = &session.completed_at {
        out.push_str(&format!("- Completed-At: {}\n", format_ts(ts)));
    }

    out.push_str("\n## Intention\n\n");
    if !session.intention.is_empty() {
        out.push_str(&session.intention);
        out.push('\n');
    }

    out.push_str("\n## Tasks\n");

    for task in &session.tasks {
        out.push('\n');
        out.push_str(&format!("### {}\n", task.task_id));
        out.push_str(&format!("- Name: {}\n", task.name));
        out.push_str(&format!("- Status: {}\n", task.status));
        out.push_str(&format!("- Priority: {}\n", task.priority));
        if !task.dependencies.is_empty() {
            out.push_str(&format!("- Depends-On: {}\n", task.dependencies.join(", ")));
        }
        if let Some(apprentice) = &task.assigned_to {
            out.push_str(&format!("- Assigned-To: {}\n", apprentice));
        }
        if let Some(ts) = &task.started_at {
            out.push_str(&format!("- Started-At: {}\n", format_ts(ts)));
        }
        if let Some(ts) = &task.completed_at {
            out.push_str(&format!("- Completed-At: {}\n", format_ts(ts)));
        }

        if !task.description.is_empty() {
            out.push('\n');
            out.push_str(&task.description);
            out.push('\n');
        }
        if let Some(output) = &task.output {
            out.push_str("\n#### Output\n\n");
            out.push_str(output);
            out.push('\n');
        }
        if let Some(error) = &task.error {
            out.push_str("\n#### Error\n\n");
            out.push_str(error);
            out.push('\n');
        }
    }

    out
}

/// Key/value from a `- Key: value` list line
fn field_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("- ")?;
    let (key, value) = rest.split_once(':')?;
    Some((key.trim(), value.trim()))
}

#[derive(Default)]
struct TaskDraft {
    task_id: String,
    name: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    dependencies: Vec<String>,
    assigned_to: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    description: Vec<String>,
    output: Vec<String>,
    error: Vec<String>,
    in_fields: bool,
}

impl TaskDraft {
    fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.trim().to_string(),
            in_fields: true,
            ..Self::default()
        }
    }

    /// Promote the draft to a `Task`, or drop it if the record is unreadable.
    ///
    /// A record needs a non-empty id and a parseable status to be kept; a
    /// present-but-garbled priority also drops it. Absent optional fields
    /// fall back to defaults.
    fn build(self) -> Option<Task> {
        if self.task_id.is_empty() {
            return None;
        }
        let status: TaskStatus = match self.status.as_deref() {
            Some(s) => s.parse().ok()?,
            None => {
                debug!("Dropping task record without status: {}", self.task_id);
                return None;
            }
        };
        let priority: Priority = match self.priority.as_deref() {
            Some(p) => p.parse().ok()?,
            None => Priority::default(),
        };

        let join = |lines: Vec<String>| -> String { lines.join("\n").trim().to_string() };
        let output = join(self.output);
        let error = join(self.error);

        Some(Task {
            task_id: self.task_id,
            name: self.name.unwrap_or_default(),
            description: join(self.description),
            priority,
            dependencies: self.dependencies,
            status,
            assigned_to: self.assigned_to.filter(|s| !s.is_empty()),
            started_at: self.started_at.as_deref().and_then(parse_ts),
            completed_at: self.completed_at.as_deref().and_then(parse_ts),
            output: (!output.is_empty()).then_some(output),
            error: (!error.is_empty()).then_some(error),
        })
    }
}

enum Section {
    Header,
    Intention,
    Tasks,
    TaskOutput,
    TaskError,
}

/// Parse ledger text into metadata and task records
///
/// Never fails: arbitrary non-ledger input yields `metadata: None` and an
/// empty task list; a truncated document yields whatever could be fully read.
pub fn parse(text: &str) -> ParsedLedger {
    let mut section = Section::Header;

    let mut header_id = None;
    let mut header_name = None;
    let mut header_initiator = None;
    let mut header_status = None;
    let mut header_created = None;
    let mut header_completed = None;
    let mut intention_lines: Vec<String> = Vec::new();

    let mut tasks: Vec<Task> = Vec::new();
    let mut draft: Option<TaskDraft> = None;

    for line in text.lines() {
        let trimmed = line.trim_end();

        // Section transitions are recognised anywhere in the document.
        if trimmed == "## Intention" {
            section = Section::Intention;
            continue;
        }
        if trimmed == "## Tasks" {
            section = Section::Tasks;
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix("### ") {
            if let Some(done) = draft.take() {
                tasks.extend(done.build());
            }
            draft = Some(TaskDraft::new(heading));
            section = Section::Tasks;
            continue;
        }
        if trimmed == "#### Output" && draft.is_some() {
            section = Section::TaskOutput;
            continue;
        }
        if trimmed == "#### Error" && draft.is_some() {
            section = Section::TaskError;
            continue;
        }

        match section {
            Section::Header => {
                if let Some((key, value)) = field_line(trimmed) {
                    match key {
                        "Ceremony-Id" => header_id = Some(value.to_string()),
                        "Name" => header_name = Some(value.to_string()),
                        "Initiator" => header_initiator = Some(value.to_string()),
                        "Status" => header_status = Some(value.to_string()),
                        "Created-At" => header_created = parse_ts(value),
                        "Completed-At" => header_completed = parse_ts(value),
                        _ => {}
                    }
                }
            }
            Section::Intention => {
                intention_lines.push(trimmed.to_string());
            }
            Section::Tasks => {
                if let Some(d) = draft.as_mut() {
                    if d.in_fields {
                        // The field block ends at the first blank line, so a
                        // description line that happens to look like a field
                        // is kept as description text.
                        if trimmed.is_empty() {
                            d.in_fields = false;
                            continue;
                        }
                        if let Some((key, value)) = field_line(trimmed) {
                            match key {
                                "Name" => d.name = Some(value.to_string()),
                                "Status" => d.status = Some(value.to_string()),
                                "Priority" => d.priority = Some(value.to_string()),
                                "Depends-On" => {
                                    d.dependencies = value
                                        .split(',')
                                        .map(|s| s.trim().to_string())
                                        .filter(|s| !s.is_empty())
                                        .collect();
                                }
                                "Assigned-To" => d.assigned_to = Some(value.to_string()),
                                "Started-At" => d.started_at = Some(value.to_string()),
                                "Completed-At" => d.completed_at = Some(value.to_string()),
                                _ => {}
                            }
                            continue;
                        }
                        d.in_fields = false;
                        d.description.push(trimmed.to_string());
                    } else {
                        d.description.push(trimmed.to_string());
                    }
                }
            }
            Section::TaskOutput => {
                if let Some(d) = draft.as_mut() {
                    d.output.push(trimmed.to_string());
                }
            }
            Section::TaskError => {
                if let Some(d) = draft.as_mut() {
                    d.error.push(trimmed.to_string());
                }
            }
        }
    }

    if let Some(done) = draft.take() {
        tasks.extend(done.build());
    }

    let metadata = match (header_id, header_status) {
        (Some(ceremony_id), Some(status)) if !ceremony_id.is_empty() => {
            status
                .parse::<CeremonyStatus>()
                .ok()
                .map(|status| LedgerMetadata {
                    ceremony_id,
                    name: header_name.unwrap_or_default(),
                    initiator: header_initiator.unwrap_or_default(),
                    intention: intention_lines.join("\n").trim().to_string(),
                    status,
                    created_at: header_created,
                    completed_at: header_completed,
                })
        }
        _ => None,
    };

    ParsedLedger { metadata, tasks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::Priority;

    fn sample_session() -> CeremonySession {
        let tasks = vec![
            Task::new("shear", "Shear the sheep")
                .with_description("Collect this season's fleece.")
                .with_priority(Priority::High),
            Task::new("card", "Card the wool")
                .with_description("Comb the fleece into rovings.")
                .with_dependencies(vec!["shear".to_string()]),
            Task::new("spin", "Spin the thread")
                .with_priority(Priority::Low)
                .with_dependencies(vec!["card".to_string()]),
        ];
        CeremonySession::new(
            "Autumn tapestry",
            "mira",
            "Weave the autumn tapestry before the frost.",
            tasks,
            "ledger.md",
        )
    }

    #[test]
    fn test_round_trip_preserves_session() {
        let mut session = sample_session();
        session.status = atelier_core::CeremonyStatus::InProgress;
        {
            let task = session.task_mut("shear").unwrap();
            task.status = TaskStatus::Complete;
            task.assigned_to = Some("app-1a2b3c4d".to_string());
            task.started_at = Some(Utc::now());
            task.completed_at = Some(Utc::now());
            task.output = Some("Twelve sacks of fleece.".to_string());
        }

        let text = render(&session);
        let parsed = parse(&text);

        let meta = parsed.metadata.expect("metadata should parse");
        assert_eq!(meta.ceremony_id, session.ceremony_id);
        assert_eq!(meta.name, session.name);
        assert_eq!(meta.initiator, session.initiator);
        assert_eq!(meta.intention, session.intention);
        assert_eq!(meta.status, session.status);
        assert_eq!(meta.created_at, Some(session.created_at));

        assert_eq!(parsed.tasks.len(), 3);
        for (parsed_task, original) in parsed.tasks.iter().zip(&session.tasks) {
            assert_eq!(parsed_task.task_id, original.task_id);
            assert_eq!(parsed_task.name, original.name);
            assert_eq!(parsed_task.status, original.status);
            assert_eq!(parsed_task.priority, original.priority);
            assert_eq!(parsed_task.dependencies, original.dependencies);
            assert_eq!(parsed_task.description, original.description);
            assert_eq!(parsed_task.assigned_to, original.assigned_to);
            assert_eq!(parsed_task.started_at, original.started_at);
            assert_eq!(parsed_task.completed_at, original.completed_at);
            assert_eq!(parsed_task.output, original.output);
            assert_eq!(parsed_task.error, original.error);
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let session = sample_session();
        assert_eq!(render(&session), render(&session));
    }

    #[test]
    fn test_parse_garbage_never_panics() {
        for garbage in [
            "",
            "not a ledger at all",
            "### \n- Status: complete\n",
            "- Ceremony-Id: \n- Status: in_progress\n",
            "## Tasks\n### orphan\n",
            "\u{0}\u{1}\u{2} binary junk ###",
        ] {
            let parsed = parse(garbage);
            assert!(parsed.metadata.is_none(), "input: {:?}", garbage);
        }
    }

    #[test]
    fn test_truncated_record_is_dropped() {
        let session = sample_session();
        let text = render(&session);

        // Cut the document in the middle of the last task record, before its
        // status line was written out.
        let cut = text.rfind("- Status:").unwrap();
        let parsed = parse(&text[..cut]);

        assert!(parsed.metadata.is_some());
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[0].task_id, "shear");
        assert_eq!(parsed.tasks[1].task_id, "card");
    }

    #[test]
    fn test_bad_record_does_not_poison_document() {
        let text = "\
# Ceremony Ledger

- Ceremony-Id: cer-aaaa1111
- Name: test
- Initiator: mira
- Status: in_progress
- Created-At: 2026-08-04T12:00:00.000000Z

## Tasks

### broken
- Name: Broken task
- Status: not-a-status
- Priority: high

### fine
- Name: Fine task
- Status: pending
- Priority: medium
";
        let parsed = parse(text);
        assert!(parsed.metadata.is_some());
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].task_id, "fine");
    }

    #[test]
    fn test_unparseable_timestamp_treated_as_absent() {
        let text = "\
# Ceremony Ledger

- Ceremony-Id: cer-aaaa1111
- Status: in_progress
- Created-At: yesterday-ish

## Tasks

### t1
- Name: Task
- Status: pending
- Priority: low
- Started-At: around noon
";
        let parsed = parse(text);
        assert!(parsed.metadata.as_ref().unwrap().created_at.is_none());
        assert!(parsed.tasks[0].started_at.is_none());
    }

    #[test]
    fn test_field_shaped_description_line_round_trips() {
        let mut session = sample_session();
        session.task_mut("shear").unwrap().description =
            "- Note: the flock is in the upper pasture\nBring shears.".to_string();

        let parsed = parse(&render(&session));
        assert_eq!(
            parsed.tasks[0].description,
            "- Note: the flock is in the upper pasture\nBring shears."
        );
    }

    #[test]
    fn test_missing_priority_defaults_to_medium() {
        let text = "\
# Ceremony Ledger

- Ceremony-Id: cer-aaaa1111
- Status: initiated

## Tasks

### t1
- Name: Task
- Status: pending
";
        let parsed = parse(text);
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].priority, Priority::Medium);
    }
}
