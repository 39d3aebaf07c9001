use serde::Serialize;

/// Diagnostic tallies. Cleared on reset, otherwise only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub tx_bytes: u64,
    pub tx_data_bytes: u64,
    pub tx_data_frames: u64,
    pub tx_ack_frames: u64,
    pub tx_nak_frames: u64,
    pub tx_retransmitted: u64,
    pub tx_cancelled: u64,
    pub rx_bytes: u64,
    pub rx_data_bytes: u64,
    pub rx_data_frames: u64,
    pub rx_ack_frames: u64,
    pub rx_nak_frames: u64,
    pub rx_cancelled: u64,
    pub rx_crc_errors: u64,
    pub rx_comm_errors: u64,
    pub rx_too_short: u64,
    pub rx_too_long: u64,
    pub rx_bad_control: u64,
    pub rx_bad_length: u64,
    pub rx_bad_ack_number: u64,
    pub rx_no_buffer: u64,
    pub rx_duplicates: u64,
    pub rx_out_of_sequence: u64,
    pub rx_ack_timeouts: u64,
}

impl Counters {
    /// Name/value pairs in declaration order, for tabular output.
    pub fn entries(&self) -> [(&'static str, u64); 24] {
        [
            ("tx_bytes", self.tx_bytes),
            ("tx_data_bytes", self.tx_data_bytes),
            ("tx_data_frames", self.tx_data_frames),
            ("tx_ack_frames", self.tx_ack_frames),
            ("tx_nak_frames", self.tx_nak_frames),
            ("tx_retransmitted", self.tx_retransmitted),
            ("tx_cancelled", self.tx_cancelled),
            ("rx_bytes", self.rx_bytes),
            ("rx_data_bytes", self.rx_data_bytes),
            ("rx_data_frames", self.rx_data_frames),
            ("rx_ack_frames", self.rx_ack_frames),
            ("rx_nak_frames", self.rx_nak_frames),
            ("rx_cancelled", self.rx_cancelled),
            ("rx_crc_errors", self.rx_crc_errors),
            ("rx_comm_errors", self.rx_comm_errors),
            ("rx_too_short", self.rx_too_short),
            ("rx_too_long", self.rx_too_long),
            ("rx_bad_control", self.rx_bad_control),
            ("rx_bad_length", self.rx_bad_length),
            ("rx_bad_ack_number", self.rx_bad_ack_number),
            ("rx_no_buffer", self.rx_no_buffer),
            ("rx_duplicates", self.rx_duplicates),
            ("rx_out_of_sequence", self.rx_out_of_sequence),
            ("rx_ack_timeouts", self.rx_ack_timeouts),
        ]
    }

    /// Total frame-level receive errors.
    pub fn rx_errors(&self) -> u64 {
        self.rx_crc_errors
            + self.rx_comm_errors
            + self.rx_too_short
            + self.rx_too_long
            + self.rx_bad_control
            + self.rx_bad_length
            + self.rx_bad_ack_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_match_serialized_fields() {
        let counters = Counters {
            rx_crc_errors: 2,
            rx_bad_length: 1,
            ..Counters::default()
        };
        let json = serde_json::to_value(&counters).unwrap();
        let object = json.as_object().unwrap();
        let entries = counters.entries();
        assert_eq!(object.len(), entries.len());
        for (name, value) in entries {
            assert_eq!(object[name], value, "{name}");
        }
        assert_eq!(counters.rx_errors(), 3);
    }
}
