// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer configuration (§6.3), a fluent builder in the style of
//! `hdds::dds::participant::ParticipantBuilder` / writer and reader QoS
//! builders, validated once in [`LayerConfig::build`].

use std::time::Duration;

use crate::connection::WindowShape;
use crate::error::{Error, Result};
use crate::window::DEFAULT_RESIZE_FACTOR;

/// Runtime-adjustable options for a [`crate::layer::UnicastLayer`],
/// enumerated in §6.3 of the core spec.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    max_msg_batch_size: usize,
    conn_expiry_timeout: Duration,
    xmit_table_num_rows: usize,
    xmit_table_msgs_per_row: usize,
    xmit_table_resize_factor: f64,
    xmit_table_max_compaction_time: Duration,
    xmit_interval: Duration,
    log_not_found_msgs: bool,
    ack_batches_immediately: bool,
    max_retransmit_time: Duration,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            max_msg_batch_size: 500,
            conn_expiry_timeout: Duration::ZERO,
            xmit_table_num_rows: 100,
            xmit_table_msgs_per_row: 10_000,
            xmit_table_resize_factor: DEFAULT_RESIZE_FACTOR,
            xmit_table_max_compaction_time: Duration::from_secs(10 * 60),
            xmit_interval: Duration::from_millis(500),
            log_not_found_msgs: false,
            ack_batches_immediately: false,
            max_retransmit_time: Duration::ZERO,
        }
    }
}

impl LayerConfig {
    pub fn builder() -> LayerConfigBuilder {
        LayerConfigBuilder(Self::default())
    }

    pub fn max_msg_batch_size(&self) -> usize {
        self.max_msg_batch_size
    }

    pub fn conn_expiry_timeout(&self) -> Duration {
        self.conn_expiry_timeout
    }

    pub fn reaper_enabled(&self) -> bool {
        self.conn_expiry_timeout > Duration::ZERO
    }

    pub fn xmit_interval(&self) -> Duration {
        self.xmit_interval
    }

    pub fn log_not_found_msgs(&self) -> bool {
        self.log_not_found_msgs
    }

    pub fn ack_batches_immediately(&self) -> bool {
        self.ack_batches_immediately
    }

    pub fn max_retransmit_time(&self) -> Duration {
        self.max_retransmit_time
    }

    pub fn window_shape(&self) -> WindowShape {
        WindowShape {
            initial_rows: self.xmit_table_num_rows,
            cols: self.xmit_table_msgs_per_row,
            resize_factor: self.xmit_table_resize_factor,
            max_compaction_time: self.xmit_table_max_compaction_time,
        }
    }
}

/// Fluent builder for [`LayerConfig`].
#[derive(Debug, Clone)]
pub struct LayerConfigBuilder(LayerConfig);

impl LayerConfigBuilder {
    pub fn max_msg_batch_size(mut self, v: usize) -> Self {
        self.0.max_msg_batch_size = v;
        self
    }

    pub fn conn_expiry_timeout(mut self, v: Duration) -> Self {
        self.0.conn_expiry_timeout = v;
        self
    }

    pub fn xmit_table_num_rows(mut self, v: usize) -> Self {
        self.0.xmit_table_num_rows = v;
        self
    }

    pub fn xmit_table_msgs_per_row(mut self, v: usize) -> Self {
        self.0.xmit_table_msgs_per_row = v;
        self
    }

    pub fn xmit_table_resize_factor(mut self, v: f64) -> Self {
        self.0.xmit_table_resize_factor = v;
        self
    }

    pub fn xmit_table_max_compaction_time(mut self, v: Duration) -> Self {
        self.0.xmit_table_max_compaction_time = v;
        self
    }

    pub fn xmit_interval(mut self, v: Duration) -> Self {
        self.0.xmit_interval = v;
        self
    }

    pub fn log_not_found_msgs(mut self, v: bool) -> Self {
        self.0.log_not_found_msgs = v;
        self
    }

    pub fn ack_batches_immediately(mut self, v: bool) -> Self {
        self.0.ack_batches_immediately = v;
        self
    }

    pub fn max_retransmit_time(mut self, v: Duration) -> Self {
        self.0.max_retransmit_time = v;
        self
    }

    /// Validate and produce the final [`LayerConfig`].
    pub fn build(self) -> Result<LayerConfig> {
        let cfg = self.0;
        if cfg.max_msg_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "max_msg_batch_size must be >= 1".into(),
            ));
        }
        if cfg.xmit_table_msgs_per_row == 0 {
            return Err(Error::InvalidConfig(
                "xmit_table_msgs_per_row must be >= 1".into(),
            ));
        }
        if cfg.xmit_table_num_rows == 0 {
            return Err(Error::InvalidConfig(
                "xmit_table_num_rows must be >= 1".into(),
            ));
        }
        if cfg.xmit_table_resize_factor <= 1.0 {
            return Err(Error::InvalidConfig(
                "xmit_table_resize_factor must be > 1.0".into(),
            ));
        }
        if cfg.xmit_interval.is_zero() {
            return Err(Error::InvalidConfig("xmit_interval must be > 0".into()));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_cleanly() {
        let cfg = LayerConfig::builder().build().expect("defaults are valid");
        assert_eq!(cfg.max_msg_batch_size(), 500);
        assert!(!cfg.reaper_enabled());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let result = LayerConfig::builder().max_msg_batch_size(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_xmit_interval() {
        let result = LayerConfig::builder().xmit_interval(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn conn_expiry_timeout_enables_reaper() {
        let cfg = LayerConfig::builder()
            .conn_expiry_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        assert!(cfg.reaper_enabled());
    }
}
