const COMMANDS_COMPLETE: &str = "allCommandsComplete";
const REPORTER_RESULT: &str = "reporterResult";

/// Inbound frame received from the rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The outstanding actuation finished.
    CommandComplete { success: bool },
    /// Value of a previously requested reporter.
    ReporterResult { name: String, value: String },
    /// Anything the engine does not understand.
    Unknown { raw: String },
}

impl Response {
    /// Decode a single transport frame.
    ///
    /// Never fails: frames that match no known shape come back as
    /// [`Response::Unknown`] so the caller can log and move on.
    pub fn parse(raw: &str) -> Response {
        if let Some(flag) = raw.strip_prefix(COMMANDS_COMPLETE) {
            // Early firmware sends the bare token on success.
            let success = flag.chars().next().is_none_or(|c| c == '1');
            return Response::CommandComplete { success };
        }

        if raw.starts_with(REPORTER_RESULT) {
            let parts = raw.split(' ').collect::<Vec<&str>>();
            if parts.len() == 3 && parts[0] == REPORTER_RESULT {
                return Response::ReporterResult {
                    name: parts[1].to_string(),
                    value: parts[2].to_string(),
                };
            }
        }

        Response::Unknown {
            raw: raw.to_string(),
        }
    }
}

impl From<&str> for Response {
    fn from(value: &str) -> Self {
        Response::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_complete_flags() {
        assert_eq!(
            Response::parse("allCommandsComplete1"),
            Response::CommandComplete { success: true }
        );
        assert_eq!(
            Response::parse("allCommandsComplete0"),
            Response::CommandComplete { success: false }
        );
        assert_eq!(
            Response::parse("allCommandsCompleteX"),
            Response::CommandComplete { success: false }
        );
    }

    #[test]
    fn bare_command_complete_is_success() {
        assert_eq!(
            Response::parse("allCommandsComplete"),
            Response::CommandComplete { success: true }
        );
    }

    #[test]
    fn reporter_result() {
        assert_eq!(
            Response::parse("reporterResult roverX 12.5"),
            Response::ReporterResult {
                name: "roverX".to_string(),
                value: "12.5".to_string()
            }
        );
    }

    #[test]
    fn malformed_reporter_results_are_unknown() {
        for raw in [
            "reporterResult roverX",
            "reporterResult roverX 1.0 extra",
            "reporterResult  roverX 1.0",
            "reporterResultroverX 1.0 2.0",
            "reporterResult",
        ] {
            assert_eq!(
                Response::parse(raw),
                Response::Unknown {
                    raw: raw.to_string()
                },
                "{raw:?} should not decode"
            );
        }
    }

    #[test]
    fn garbage_is_unknown() {
        let response: Response = "garbage".into();

        assert_eq!(
            response,
            Response::Unknown {
                raw: "garbage".to_string()
            }
        );
    }
}
