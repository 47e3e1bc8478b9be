use crate::cluster::MemberId;

pub const USAGE_PUT: &str = "PUT key value";
pub const USAGE_GET: &str = "GET key";
pub const USAGE_DEL: &str = "DEL key";
pub const USAGE_LIST: &str = "LIST";
pub const USAGE_LOG: &str = "LOG";
pub const USAGE_METRICS: &str = "METRICS";
pub const USAGE_EXIT: &str = "EXIT";
pub const USAGE_ADD_LEARNER: &str = "ADD-LEARNER node_id \"api_addr\"";
pub const USAGE_CHANGE_MEMBERSHIP: &str = "CHANGE-MEMBERSHIP node_id1 node_id2 ...";

pub const ALL_USAGES: [&str; 9] = [
    USAGE_PUT,
    USAGE_GET,
    USAGE_DEL,
    USAGE_LIST,
    USAGE_LOG,
    USAGE_METRICS,
    USAGE_ADD_LEARNER,
    USAGE_CHANGE_MEMBERSHIP,
    USAGE_EXIT,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    List,
    Log,
    Exit,
    AddLearner { node_id: MemberId, api_addr: String },
    ChangeMembership { node_ids: Vec<MemberId> },
    Metrics,
}

impl Command {
    /// Lower-cases and tokenizes `line`. Keys and values are lower-cased too.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim().to_lowercase();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = tokens.split_first() else {
            return Err(CommandError::Unrecognized {
                token: String::new(),
            });
        };

        match head {
            "put" => match args {
                [key, value] => Ok(Self::Put {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(CommandError::Usage { usage: USAGE_PUT }),
            },
            "get" => match args {
                [key] => Ok(Self::Get {
                    key: key.to_string(),
                }),
                _ => Err(CommandError::Usage { usage: USAGE_GET }),
            },
            "del" => match args {
                [key] => Ok(Self::Delete {
                    key: key.to_string(),
                }),
                _ => Err(CommandError::Usage { usage: USAGE_DEL }),
            },
            "list" => no_args(args, Self::List, USAGE_LIST),
            "log" => no_args(args, Self::Log, USAGE_LOG),
            "metrics" => no_args(args, Self::Metrics, USAGE_METRICS),
            "exit" => no_args(args, Self::Exit, USAGE_EXIT),
            "add-learner" => match args {
                [node_id, api_addr] => Ok(Self::AddLearner {
                    node_id: parse_member_id(node_id)?,
                    api_addr: api_addr.trim_matches(|c| c == '"' || c == '\'').to_string(),
                }),
                _ => Err(CommandError::Usage {
                    usage: USAGE_ADD_LEARNER,
                }),
            },
            "change-membership" => {
                if args.is_empty() {
                    return Err(CommandError::Usage {
                        usage: USAGE_CHANGE_MEMBERSHIP,
                    });
                }
                let node_ids = args
                    .iter()
                    .map(|raw| parse_member_id(raw))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::ChangeMembership { node_ids })
            }
            other => Err(CommandError::Unrecognized {
                token: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Get { .. } => "get",
            Self::Delete { .. } => "delete",
            Self::List => "list",
            Self::Log => "log",
            Self::Exit => "exit",
            Self::AddLearner { .. } => "add_learner",
            Self::ChangeMembership { .. } => "change_membership",
            Self::Metrics => "metrics",
        }
    }

    /// Membership changes always go to the primary proxy; everything else to the caller's own.
    pub fn targets_primary(&self) -> bool {
        matches!(self, Self::AddLearner { .. } | Self::ChangeMembership { .. })
    }
}

fn no_args(args: &[&str], cmd: Command, usage: &'static str) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(CommandError::Usage { usage })
    }
}

fn parse_member_id(raw: &str) -> Result<MemberId, CommandError> {
    raw.parse::<MemberId>()
        .map_err(|_| CommandError::InvalidNodeId {
            raw: raw.to_string(),
        })
}

/// A malformed command line. Never forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Unrecognized { token: String },
    Usage { usage: &'static str },
    InvalidNodeId { raw: String },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrecognized { .. } => {
                write!(f, "unrecognized command; type HELP for the command list")
            }
            Self::Usage { usage } => write!(f, "wrong command format; usage: {usage}"),
            Self::InvalidNodeId { raw } => write!(f, "node id must be an integer, got: {raw}"),
        }
    }
}

impl std::error::Error for CommandError {}
