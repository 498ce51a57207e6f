//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 会话级时序估计测试（模拟数据源 + 丢包）
//! - 模拟 e2e 测试（UDP -> 接收 -> 分发 -> sink）

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, SessionBlueprint, TimingConfig, BROADCAST_RATES};

    #[test]
    fn test_blueprint_defaults_snapshot() {
        let blueprint = SessionBlueprint::with_log_sink();
        let json = serde_json::to_value(&blueprint).unwrap();

        assert_eq!(blueprint.version, ConfigVersion::V1);
        assert_eq!(json["receiver"]["port"], 54321);
        assert_eq!(json["receiver"]["subject_name"], "Camera");
        assert_eq!(json["timing"]["default_frame_rate"]["numerator"], 60);
        assert_eq!(json["timing"]["default_frame_rate"]["denominator"], 1);
        assert_eq!(json["sinks"][0]["sink_type"], "log");
        assert_eq!(
            json["timing"]["valid_timecode_rates"]
                .as_array()
                .map(Vec::len),
            Some(BROADCAST_RATES.len())
        );
        assert_eq!(blueprint.timing, TimingConfig::default());
    }
}

#[cfg(test)]
mod session_tests {
    use contracts::{FrameRate, TimingConfig};
    use ingestion::{
        FallbackRate, LossPattern, MockStypeConfig, MockStypeSource, TrackingSession,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn session(fallback: FrameRate) -> TrackingSession {
        TrackingSession::new(
            "Camera",
            &TimingConfig::default(),
            FallbackRate::new(fallback),
        )
    }

    /// 25fps 时间码, 50Hz 采样: 确认后场景时间等于包序号
    #[test]
    fn test_mock_stream_converges_to_packet_index() {
        let mut session = session(FrameRate::from_fps(60));
        let source = MockStypeSource::new(MockStypeConfig {
            timecode_rate: 25,
            packet_rate: 50,
            count: Some(400),
            ..Default::default()
        });

        let mut first_valid = None;
        for (index, packet) in source.enumerate() {
            let frame = session.process(&packet).frame;
            let index = index as u64;

            if frame.timing_valid {
                first_valid.get_or_insert(index);
                assert_eq!(frame.scene_time.frame_rate, FrameRate::from_fps(50));
                assert_eq!(frame.scene_time.frame_number, index, "index {index}");
            } else {
                assert!(first_valid.is_none(), "validity lost at {index}");
                assert_eq!(
                    frame.scene_time.frame_rate,
                    FrameRate::from_fps(60),
                    "fallback rate before confirmation"
                );
            }
        }

        let first_valid = first_valid.expect("estimation never confirmed");
        assert!(first_valid <= 200, "confirmed late at {first_valid}");
        assert_eq!(first_valid % 50, 0, "confirmation happens on a second boundary");
        assert_eq!(session.estimator().timecode_rate_estimate(), 25);
        assert_eq!(session.estimator().sample_rate_estimate(), 50);
    }

    /// 周期性丢包 (不丢秒边界) 不影响场景时间
    #[test]
    fn test_periodic_loss_keeps_exact_time() {
        let mut session = session(FrameRate::from_fps(60));
        let source = MockStypeSource::new(MockStypeConfig {
            timecode_rate: 30,
            packet_rate: 60,
            loss: LossPattern::EveryNth(7),
            ..Default::default()
        });
        let loss = source.config().loss.clone();

        let mut valid_frames = 0;
        for index in (0..400u64).filter(|&index| !loss.is_lost(index)) {
            let frame = session.process(&source.packet_at(index)).frame;
            if frame.timing_valid {
                valid_frames += 1;
                assert_eq!(frame.scene_time.frame_number, index);
                assert_eq!(frame.scene_time.frame_rate, FrameRate::from_fps(60));
            }
        }
        assert!(valid_frames > 100);
    }

    /// 随机丢包 (每秒首尾两个包总能到达)
    #[test]
    fn test_seeded_random_loss() {
        let mut rng = StdRng::seed_from_u64(0x5717_9E);
        let mut session = session(FrameRate::from_fps(60));
        let source = MockStypeSource::with_rates(24, 48);

        let mut last_valid_frame = None;
        for index in 0..48 * 10u64 {
            let in_second = index % 48;
            if in_second != 0 && in_second < 46 && rng.random_bool(0.2) {
                continue;
            }
            let frame = session.process(&source.packet_at(index)).frame;
            if frame.timing_valid {
                assert_eq!(frame.scene_time.frame_number, index);
                last_valid_frame = Some(frame.scene_time.frame_number);
            }
        }
        assert!(last_valid_frame.is_some());
    }

    /// 回退速率可在运行中修改, 非法速率被拒绝
    #[test]
    fn test_fallback_rate_handle() {
        let fallback = FallbackRate::new(FrameRate::from_fps(30));
        let mut session = TrackingSession::new("Camera", &TimingConfig::default(), fallback.clone());
        let source = MockStypeSource::new(MockStypeConfig {
            timecode_rate: 25,
            packet_rate: 25,
            start_timecode: contracts::Timecode::new(0, 0, 1, 10),
            ..Default::default()
        });

        let frame = session.process(&source.packet_at(0)).frame;
        assert!(!frame.timing_valid);
        assert_eq!(frame.scene_time.frame_number, 40);
        assert_eq!(frame.scene_time.frame_rate, FrameRate::from_fps(30));

        assert!(fallback.set(FrameRate::from_fps(200)).is_err());
        fallback.set(FrameRate::from_fps(25)).unwrap();

        let frame = session.process(&source.packet_at(1)).frame;
        assert_eq!(frame.scene_time.frame_rate, FrameRate::from_fps(25));
        assert_eq!(frame.scene_time.frame_number, 36);
    }

    /// 回退到确认的切换只发生一次, 场景时间不倒退
    #[test]
    fn test_timing_metrics_over_session() {
        let mut session = session(FrameRate::from_fps(60));
        let mut aggregator = observability::TimingMetricsAggregator::new();
        let source = MockStypeSource::new(MockStypeConfig {
            timecode_rate: 25,
            packet_rate: 50,
            count: Some(400),
            ..Default::default()
        });

        for packet in source {
            aggregator.update(&session.process(&packet).frame);
        }

        let summary = aggregator.summary();
        assert_eq!(summary.total_frames, 400);
        assert_eq!(summary.valid_frames + summary.fallback_frames, 400);
        assert!(summary.valid_frames >= 200);
        assert_eq!(summary.validity_changes, 1);
        assert_eq!(summary.rate_changes, 1);
        assert_eq!(summary.backward_steps, 0);
        assert_eq!(aggregator.current_rate(), Some(FrameRate::from_fps(50)));

        let snapshot = session.estimator().snapshot();
        assert!(snapshot.timecode_rate_confirmed && snapshot.sample_rate_confirmed);
        assert_eq!(
            timing_engine::elapsed_sequence(snapshot.last_package_no, 0),
            256 - u32::from(snapshot.last_package_no)
        );
    }

    /// 首包输出镜头静态数据, 之后不重复
    #[test]
    fn test_lens_static_only_on_change() {
        let mut session = session(FrameRate::from_fps(60));
        let source = MockStypeSource::with_rates(25, 50);

        let first = session.process(&source.packet_at(0));
        let lens = first.lens_update.expect("lens data on first packet");
        assert!((lens.film_back_width - 9.6).abs() < 1e-6);
        assert!(!lens.focus_distance_supported);

        assert!(session.process(&source.packet_at(1)).lens_update.is_none());

        let mut dof = source.packet_at(2);
        dof.command |= contracts::COMMAND_DEPTH_OF_FIELD;
        let update = session.process(&dof).lens_update.expect("DOF flip republishes");
        assert!(update.focus_distance_supported);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use contracts::{
        ReceiverConfig, SinkConfig, SinkType, TimingConfig, TrackingFrame,
    };
    use dispatcher::create_dispatcher;
    use ingestion::{MockStypeConfig, MockStypeSource, StypeReceiver};
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    fn local_receiver() -> ReceiverConfig {
        ReceiverConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            channel_capacity: 1024,
            ..Default::default()
        }
    }

    /// End-to-end: MockStypeSource -(UDP)-> StypeReceiver -> Dispatcher -> FileSink
    ///
    /// 验证完整的数据流：
    /// 1. 模拟数据源以 UDP 发送 Stype 包
    /// 2. 接收器解码并估计场景时间
    /// 3. Dispatcher 将 TrackingFrame 写入 JSON-lines 文件
    #[tokio::test]
    async fn test_e2e_udp_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");

        // Dispatcher with file + log sinks
        let (frame_tx, frame_rx) = mpsc::channel::<TrackingFrame>(1024);
        let sinks = vec![
            SinkConfig {
                name: "recorder".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 1024,
                params: HashMap::from([(
                    "path".to_string(),
                    path.to_string_lossy().into_owned(),
                )]),
            },
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 1024,
                params: HashMap::new(),
            },
        ];
        let dispatcher = create_dispatcher(sinks, frame_rx).await.unwrap();
        let sink_metrics = dispatcher.sink_metrics();
        let dispatcher_handle = dispatcher.spawn();

        // Receiver
        let mut receiver = StypeReceiver::new(local_receiver(), TimingConfig::default())
            .spawn()
            .await
            .unwrap();
        let frames = receiver.take_frames().unwrap();
        let target = receiver.local_addr();

        let forward = tokio::spawn(async move {
            let mut forwarded = 0u64;
            while let Ok(frame) = frames.recv().await {
                forwarded += 1;
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }
            forwarded
        });

        // 4 seconds of 25fps timecode at 50Hz
        let source = MockStypeSource::new(MockStypeConfig {
            timecode_rate: 25,
            packet_rate: 50,
            count: Some(200),
            ..Default::default()
        });
        let sent = source
            .spawn_udp(target, Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, 200);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let ingestion = receiver.metrics().snapshot();
        let timing = receiver.timing_snapshot();
        receiver.shutdown().await;

        let forwarded = tokio::time::timeout(Duration::from_secs(2), forward)
            .await
            .expect("forwarder did not finish")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), dispatcher_handle)
            .await
            .expect("dispatcher did not finish")
            .unwrap();

        assert!(forwarded > 0);
        assert_eq!(ingestion.decode_errors, 0);
        assert_eq!(ingestion.packets_decoded, forwarded);
        assert!(timing.is_some());

        let content = std::fs::read_to_string(&path).unwrap();
        let written: Vec<TrackingFrame> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(written.len() as u64, forwarded);
        assert!(written.iter().all(|frame| frame.subject == "Camera"));

        for (name, metrics) in sink_metrics {
            assert_eq!(metrics.write_count(), forwarded, "sink {name}");
            assert_eq!(metrics.dropped_count(), 0, "sink {name}");
        }
    }

    /// Malformed datagrams are counted and skipped, valid ones still flow
    #[tokio::test]
    async fn test_e2e_rejects_garbage() {
        let mut receiver = StypeReceiver::new(local_receiver(), TimingConfig::default())
            .spawn()
            .await
            .unwrap();
        let frames = receiver.take_frames().unwrap();
        let target = receiver.local_addr();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&[0u8; 10], target).await.unwrap();

        let mut corrupt = ingestion::packet::encode(&MockStypeSource::with_rates(25, 50).packet_at(0)).to_vec();
        corrupt[ingestion::packet::PACKET_SIZE - 1] ^= 0xFF;
        socket.send_to(&corrupt, target).await.unwrap();

        let valid = MockStypeSource::with_rates(25, 50).packet_at(3);
        socket
            .send_to(&ingestion::packet::encode(&valid), target)
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("no frame received")
            .unwrap();
        assert_eq!(frame.package_no, 3);

        let metrics = receiver.metrics().snapshot();
        assert_eq!(metrics.decode_errors, 2);
        assert_eq!(metrics.packets_decoded, 1);
        receiver.shutdown().await;
    }

    /// Config file -> dispatcher -> network sink
    #[tokio::test]
    async fn test_config_to_network_sink() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("session.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[receiver]
port = 6301

[[sinks]]
name = "forward"
sink_type = "network"
[sinks.params]
addr = "{}"
format = "json"
"#,
                listener.local_addr().unwrap()
            ),
        )
        .unwrap();

        let blueprint = config_loader::ConfigLoader::load_from_path(&config_path).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let dispatcher = create_dispatcher(blueprint.sinks, rx).await.unwrap();
        let handle = dispatcher.spawn();

        let frame = TrackingFrame {
            subject: "CraneCam".to_string(),
            package_no: 42,
            ..Default::default()
        };
        tx.send(frame.clone()).await.unwrap();

        let mut buf = vec![0u8; 65536];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
            .await
            .expect("nothing forwarded")
            .unwrap();
        let received: TrackingFrame = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(received, frame);

        drop(tx);
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
}
