//! Structured request/response surface for automated callers.
//!
//! One JSON object per line on stdin, one response per line on stdout.
//! Every response carries a success/error discriminator; failures carry the
//! stable error code from [`Error::code`] so callers can branch without
//! parsing messages (e.g. on `another_active`, stop the active task first).

use crate::error::Error;
use crate::store::Store;
use crate::types::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::str::FromStr;

/// One request per verb.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Create {
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        criterion: Option<String>,
        #[serde(default)]
        after: Option<i64>,
        #[serde(default)]
        before: Option<i64>,
    },
    Edit {
        id: i64,
        #[serde(default)]
        title: Option<String>,
        #[serde(default, with = "double_option")]
        description: Option<Option<String>>,
        #[serde(default, with = "double_option")]
        criterion: Option<Option<String>>,
    },
    Show {
        id: i64,
    },
    List {
        #[serde(default)]
        all: bool,
        #[serde(default)]
        status: Option<String>,
    },
    SetTarget {
        id: i64,
    },
    GetTarget,
    ClearTarget,
    Next {
        #[serde(default)]
        all: bool,
    },
    Start {
        id: i64,
    },
    Stop,
    Done,
    Current,
    Block {
        id: i64,
    },
    Unblock {
        id: i64,
    },
    AddDependency {
        task_id: i64,
        depends_on: i64,
    },
    RemoveDependency {
        task_id: i64,
        depends_on: i64,
    },
    LogArtifact {
        #[serde(default)]
        task: Option<i64>,
        name: String,
        file_path: String,
    },
    Artifacts {
        #[serde(default)]
        task: Option<i64>,
    },
    Reorder {
        id: i64,
        #[serde(default)]
        after: Option<i64>,
        #[serde(default)]
        before: Option<i64>,
    },
    Reindex,
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { data: Value },
    Error { code: String, message: String },
}

impl Response {
    fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Response::Ok { data },
            Err(e) => Response::Error {
                code: "internal".to_string(),
                message: e.to_string(),
            },
        }
    }

    fn error(e: &Error) -> Self {
        Response::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Presence-aware Option<Option<T>>: an absent key leaves the field alone,
/// an explicit null clears it.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Ok(Some(Option::deserialize(deserializer)?))
    }
}

/// Dispatch one request against the store.
pub fn handle(store: &mut Store, request: Request) -> Response {
    let result = match request {
        Request::Create {
            title,
            description,
            criterion,
            after,
            before,
        } => store
            .create(
                &title,
                description.as_deref(),
                criterion.as_deref(),
                after,
                before,
            )
            .map(Response::ok),

        Request::Edit {
            id,
            title,
            description,
            criterion,
        } => store
            .edit(
                id,
                title.as_deref(),
                description.as_ref().map(Option::as_deref),
                criterion.as_ref().map(Option::as_deref),
            )
            .map(Response::ok),

        Request::Show { id } => store.get(id).map(Response::ok),

        Request::List { all, status } => status
            .as_deref()
            .map(Status::from_str)
            .transpose()
            .and_then(|filter| store.list(all, filter))
            .map(|(tasks, conflicts)| {
                Response::ok(json!({ "tasks": tasks, "conflicts": conflicts }))
            }),

        Request::SetTarget { id } => store.set_target(id).map(Response::ok),
        Request::GetTarget => store
            .target()
            .map(|target_id| Response::ok(json!({ "target_id": target_id }))),
        Request::ClearTarget => store.clear_target().map(Response::ok),

        Request::Next { all } => store.next(all).map(Response::ok),

        Request::Start { id } => store.start(id).map(Response::ok),
        Request::Stop => store.stop().map(Response::ok),
        Request::Done => store.done().map(Response::ok),
        Request::Current => store.current().map(Response::ok),
        Request::Block { id } => store.block(id).map(Response::ok),
        Request::Unblock { id } => store.unblock(id).map(Response::ok),

        Request::AddDependency {
            task_id,
            depends_on,
        } => store.add_dependency(task_id, depends_on).map(Response::ok),
        Request::RemoveDependency {
            task_id,
            depends_on,
        } => store
            .remove_dependency(task_id, depends_on)
            .map(Response::ok),

        Request::LogArtifact {
            task,
            name,
            file_path,
        } => store.log_artifact(task, &name, &file_path).map(Response::ok),
        Request::Artifacts { task } => store.artifacts(task).map(Response::ok),

        Request::Reorder { id, after, before } => {
            store.reorder(id, after, before).map(Response::ok)
        }
        Request::Reindex => store.reindex().map(Response::ok),
    };

    result.unwrap_or_else(|e| Response::error(&e))
}

/// Serve requests line by line until EOF.
pub fn serve(store: &mut Store, input: impl BufRead, mut output: impl Write) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle(store, request),
            Err(e) => Response::Error {
                code: "invalid_request".to_string(),
                message: e.to_string(),
            },
        };

        serde_json::to_writer(&mut output, &response)?;
        writeln!(output)?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let req: Request =
            serde_json::from_str(r#"{"type":"create","title":"Build the parser"}"#).unwrap();
        if let Request::Create {
            title,
            description,
            after,
            ..
        } = req
        {
            assert_eq!(title, "Build the parser");
            assert!(description.is_none());
            assert!(after.is_none());
        } else {
            panic!("wrong request type");
        }
    }

    #[test]
    fn test_edit_distinguishes_absent_from_null() {
        let req: Request = serde_json::from_str(r#"{"type":"edit","id":1}"#).unwrap();
        if let Request::Edit { criterion, .. } = req {
            assert_eq!(criterion, None);
        } else {
            panic!("wrong request type");
        }

        let req: Request =
            serde_json::from_str(r#"{"type":"edit","id":1,"criterion":null}"#).unwrap();
        if let Request::Edit { criterion, .. } = req {
            assert_eq!(criterion, Some(None));
        } else {
            panic!("wrong request type");
        }
    }

    #[test]
    fn test_response_envelope() {
        let ok = Response::ok(json!({"id": 1}));
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains("\"status\":\"ok\""));

        let err = Response::error(&Error::NoTarget);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"code\":\"no_target\""));
    }
}
