//! 配置校验模块
//!
//! 校验规则：
//! - receiver: port != 0, channel_capacity > 0, subject_name 非空
//! - timing: 最小一致次数 >= 1, 默认速率 > 0, 候选速率合法
//! - default_frame_rate 合法且不超过 timecode 帧字段上限 (127 fps)
//! - sink 名称非空且唯一, 必填参数齐全

use std::collections::HashSet;

use contracts::{
    ContractError, ReceiverConfig, SessionBlueprint, SinkType, TimingConfig, MAX_TIMECODE_RATE,
};

/// 校验 SessionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_receiver(&blueprint.receiver)?;
    validate_timing(&blueprint.timing)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验 UDP 接收配置
fn validate_receiver(receiver: &ReceiverConfig) -> Result<(), ContractError> {
    if receiver.port == 0 {
        return Err(ContractError::config_validation(
            "receiver.port",
            "port must be non-zero",
        ));
    }
    if receiver.channel_capacity == 0 {
        return Err(ContractError::config_validation(
            "receiver.channel_capacity",
            "channel_capacity must be > 0",
        ));
    }
    if receiver.subject_name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "receiver.subject_name",
            "subject_name cannot be empty",
        ));
    }
    Ok(())
}

/// 校验时序估计配置
fn validate_timing(timing: &TimingConfig) -> Result<(), ContractError> {
    let rate = timing.default_frame_rate;
    if !rate.is_valid() {
        return Err(ContractError::config_validation(
            "timing.default_frame_rate",
            format!("{}/{} is not a valid frame rate", rate.numerator, rate.denominator),
        ));
    }
    if rate.as_decimal() > f64::from(MAX_TIMECODE_RATE) {
        return Err(ContractError::config_validation(
            "timing.default_frame_rate",
            format!("{rate} exceeds the {MAX_TIMECODE_RATE} fps timecode limit"),
        ));
    }

    for (field, value) in [
        (
            "timing.timecode_rate_min_agreement",
            timing.timecode_rate_min_agreement,
        ),
        (
            "timing.sample_rate_min_agreement",
            timing.sample_rate_min_agreement,
        ),
    ] {
        if value == 0 {
            return Err(ContractError::config_validation(
                field,
                "at least one agreement is required",
            ));
        }
    }

    if timing.default_timecode_rate == 0 {
        return Err(ContractError::config_validation(
            "timing.default_timecode_rate",
            "default_timecode_rate must be > 0",
        ));
    }
    if timing.default_sample_rate == 0 {
        return Err(ContractError::config_validation(
            "timing.default_sample_rate",
            "default_sample_rate must be > 0",
        ));
    }

    for (idx, rate) in timing.valid_timecode_rates.iter().enumerate() {
        if *rate == 0 || u32::from(*rate) > MAX_TIMECODE_RATE {
            return Err(ContractError::config_validation(
                format!("timing.valid_timecode_rates[{idx}]"),
                format!("timecode rate must be in 1..={MAX_TIMECODE_RATE}, got {rate}"),
            ));
        }
    }

    for (idx, rate) in timing.valid_sample_rates.iter().enumerate() {
        if *rate == 0 {
            return Err(ContractError::config_validation(
                format!("timing.valid_sample_rates[{idx}]"),
                "sample rate must be > 0",
            ));
        }
    }

    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }

        let required = match sink.sink_type {
            SinkType::Log => None,
            SinkType::File => Some("path"),
            SinkType::Network => Some("addr"),
        };
        if let Some(param) = required {
            if !matches!(sink.params.get(param), Some(value) if !value.is_empty()) {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.{param}", sink.name),
                    format!("{:?} sink requires '{param}'", sink.sink_type),
                ));
            }
        }
    }
    Ok(())
}
