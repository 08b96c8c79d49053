use super::{ParamValue, ParameterSink};

/// Sink that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<(String, ParamValue)>,
}

impl RecordingSink {
    pub fn take(&mut self) -> Vec<(String, ParamValue)> {
        std::mem::take(&mut self.sent)
    }

    pub fn values_for(&self, parameter: &str) -> Vec<ParamValue> {
        self.sent
            .iter()
            .filter(|(name, _)| name == parameter)
            .map(|(_, value)| *value)
            .collect()
    }
}

impl ParameterSink for RecordingSink {
    fn send_parameter(&mut self, parameter: &str, value: ParamValue) {
        self.sent.push((parameter.to_string(), value));
    }
}
