//! Backup job template.
//!
//! Templates are job specs with `[[ .Field ]]` placeholders. The square
//! delimiters keep them clear of Nomad's own `${...}` and `{{ }}` syntax, so
//! runtime interpolation and `template` stanzas pass through untouched.
//!
//! Fields: `JobId`, `SourceJobId`, `Schedule`, `TargetDB`. Absent optional
//! values render as the empty string.

use std::path::{Path, PathBuf};

use super::DesiredBackupState;

/// Template compiled into the binary.
pub const EMBEDDED_TEMPLATE: &str = include_str!("../../templates/backup.hcl");

const LEFT_DELIM: &str = "[[";
const RIGHT_DELIM: &str = "]]";

/// Errors compiling a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Malformed placeholder '{text}' at byte {offset}: expected '.Field'")]
    Malformed { text: String, offset: usize },

    #[error("Unknown template field '{field}' at byte {offset}")]
    UnknownField { field: String, offset: usize },

    #[error("Failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    JobId,
    SourceJobId,
    Schedule,
    TargetDb,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "JobId" => Some(Field::JobId),
            "SourceJobId" => Some(Field::SourceJobId),
            "Schedule" => Some(Field::Schedule),
            "TargetDB" => Some(Field::TargetDb),
            _ => None,
        }
    }

    fn value<'a>(&self, state: &'a DesiredBackupState) -> &'a str {
        match self {
            Field::JobId => &state.backup_job_id,
            Field::SourceJobId => &state.source_job_id,
            Field::Schedule => state.schedule.as_deref().unwrap_or_default(),
            Field::TargetDb => state.target_database.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A compiled job template.
///
/// Every placeholder is checked against the known field set when the
/// template is compiled, so rendering cannot fail.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    segments: Vec<Segment>,
}

impl JobTemplate {
    /// Compile template text.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find(LEFT_DELIM) {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let start = offset + open;
            let after_open = &rest[open + LEFT_DELIM.len()..];
            let close = after_open
                .find(RIGHT_DELIM)
                .ok_or(TemplateError::Unterminated { offset: start })?;

            let action = after_open[..close].trim();
            let name = action
                .strip_prefix('.')
                .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric()))
                .ok_or_else(|| TemplateError::Malformed {
                    text: action.to_string(),
                    offset: start,
                })?;
            let field = Field::from_name(name).ok_or_else(|| TemplateError::UnknownField {
                field: name.to_string(),
                offset: start,
            })?;
            segments.push(Segment::Field(field));

            let consumed = open + LEFT_DELIM.len() + close + RIGHT_DELIM.len();
            rest = &rest[consumed..];
            offset += consumed;
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Compile the embedded default template.
    pub fn embedded() -> Result<Self, TemplateError> {
        Self::parse(EMBEDDED_TEMPLATE)
    }

    /// Read and compile a template file.
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    /// Load from `path` when given, otherwise the embedded template.
    pub fn load(path: Option<&Path>) -> Result<Self, TemplateError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    /// Substitute the state's fields into the template.
    pub fn render(&self, state: &DesiredBackupState) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(field.value(state)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DesiredBackupState {
        DesiredBackupState {
            backup_job_id: "backup-web-1".to_string(),
            source_job_id: "web-1".to_string(),
            schedule: Some("0 2 * * *".to_string()),
            target_database: Some("postgres".to_string()),
            enabled: true,
        }
    }

    #[test]
    fn test_render_substitutes_all_fields() {
        let template =
            JobTemplate::parse("job \"[[ .JobId ]]\" { src=\"[[.SourceJobId]]\" cron=\"[[ .Schedule ]]\" db=\"[[ .TargetDB ]]\" }")
                .unwrap();

        assert_eq!(
            template.render(&state()),
            "job \"backup-web-1\" { src=\"web-1\" cron=\"0 2 * * *\" db=\"postgres\" }"
        );
    }

    #[test]
    fn test_render_empty_optional_fields() {
        let template = JobTemplate::parse("cron=\"[[ .Schedule ]]\" db=\"[[ .TargetDB ]]\"").unwrap();
        let state = DesiredBackupState {
            schedule: None,
            target_database: None,
            ..state()
        };

        assert_eq!(template.render(&state), "cron=\"\" db=\"\"");
    }

    #[test]
    fn test_nomad_syntax_passes_through() {
        let source = "env { ADDR = \"${NOMAD_ADDR_db}\" }\ntemplate { data = \"{{ key \\\"x\\\" }}\" }";
        let template = JobTemplate::parse(source).unwrap();

        assert_eq!(template.render(&state()), source);
    }

    #[test]
    fn test_unterminated_placeholder() {
        let err = JobTemplate::parse("job \"[[ .JobId \" {}").unwrap_err();
        assert!(matches!(err, TemplateError::Unterminated { offset: 5 }));
    }

    #[test]
    fn test_unknown_field() {
        let err = JobTemplate::parse("[[ .Image ]]").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownField { ref field, .. } if field == "Image"));
    }

    #[test]
    fn test_malformed_placeholder() {
        let err = JobTemplate::parse("[[ JobId ]]").unwrap_err();
        assert!(matches!(err, TemplateError::Malformed { .. }));

        let err = JobTemplate::parse("[[ . ]]").unwrap_err();
        assert!(matches!(err, TemplateError::Malformed { .. }));
    }

    #[test]
    fn test_embedded_template_compiles_and_names_job() {
        let template = JobTemplate::embedded().unwrap();
        let rendered = template.render(&state());

        assert!(rendered.contains("job \"backup-web-1\""));
        assert!(rendered.contains("0 2 * * *"));
        assert!(rendered.contains("postgres"));
        assert!(!rendered.contains("[["));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.hcl");
        std::fs::write(&path, "job \"[[ .JobId ]]\" {}").unwrap();

        let template = JobTemplate::load(Some(&path)).unwrap();
        assert_eq!(template.render(&state()), "job \"backup-web-1\" {}");
    }

    #[test]
    fn test_load_missing_file() {
        let err = JobTemplate::load(Some(Path::new("/nonexistent/backup.hcl"))).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
