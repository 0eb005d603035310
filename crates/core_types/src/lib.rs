pub type RequestId = u64;

/// Lifecycle of one partial exchange.
///
/// `Done` is reachable from every terminal branch and is the only state that
/// lets the queue advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    Queued,
    Sending,
    Succeeded,
    ServerError,
    ClientException,
    TimedOut,
    Done,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Succeeded
                | RequestState::ServerError
                | RequestState::ClientException
                | RequestState::TimedOut
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProjectStage {
    #[default]
    Production,
    Development,
    SystemTest,
    UnitTest,
}

impl ProjectStage {
    pub fn is_production(self) -> bool {
        self == ProjectStage::Production
    }
}
