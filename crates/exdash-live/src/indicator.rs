/*
[INPUT]:  Connection progress from starter, connector and dispatcher
[OUTPUT]: Three-state connection health signal
[POS]:    Live layer - externally observable indicator value
[UPDATE]: When adding indicator states
*/

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Pending,
    Ok,
    Fail,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Indicator::Pending => "pending",
            Indicator::Ok => "ok",
            Indicator::Fail => "fail",
        };
        f.write_str(label)
    }
}
