use std::sync::Arc;
use std::time::Duration;

use gravsim::orchestrator::broadcast::{BroadcastSettings, Frame, SimulationHandle, Subscribers, Subscription};
use gravsim::orchestrator::codec::{self, decode_snapshot, encode_snapshot, CodecError};
use gravsim::orchestrator::messages::{self, AddBodiesRequest, ControlCommand, ControlMessage, MessageError};
use gravsim::orchestrator::orchestrator::{Orchestrator, OrchestratorSettings};
use gravsim::orchestrator::solver::ActiveSolver;
use gravsim::simulation::engine::{IntegrationScheme, Mode};
use gravsim::simulation::params::{Parameters, ParamsUpdate};
use gravsim::simulation::scenario::ScenarioKind;
use gravsim::tiled::device::{ContextProvider, SoftwareProvider, UnavailableProvider};

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        default_scenario: ScenarioKind::Disk,
        default_body_count: 200,
        max_body_count: 1000,
        seed: 3,
        parameters: Parameters::default(),
        start_paused: false,
    }
}

fn software() -> Arc<dyn ContextProvider> {
    Arc::new(SoftwareProvider::new(32))
}

fn unavailable() -> Arc<dyn ContextProvider> {
    Arc::new(UnavailableProvider::default())
}

fn add_request(count: usize) -> AddBodiesRequest {
    AddBodiesRequest { x: 50.0, y: -20.0, z: 5.0, vx: 1.0, vy: 0.0, vz: 0.0, count, radius: 10.0 }
}

/// Everything currently queued for a subscriber
fn drain(subscription: &mut Subscription) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(frame) = subscription.frames.try_recv() {
        frames.push(frame);
    }
    frames
}

fn snapshots(frames: &[Frame]) -> Vec<Vec<[f32; 3]>> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Snapshot(bytes) => Some(decode_snapshot(bytes).unwrap()),
            Frame::State(_) => None,
        })
        .collect()
}

fn states(frames: &[Frame]) -> Vec<serde_json::Value> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::State(json) => Some(serde_json::from_str(json).unwrap()),
            Frame::Snapshot(_) => None,
        })
        .collect()
}

// ==================================================================================
// Codec tests
// ==================================================================================

#[test]
fn snapshot_frame_layout() {
    let positions = vec![[1.0f32, 2.0, 3.0], [-4.0, 5.5, 0.0]];
    let frame = encode_snapshot(positions.clone().into_iter()).unwrap();

    assert_eq!(frame.len(), 4 + 12 * 2);
    assert_eq!(&frame[..4], &2i32.to_le_bytes());
    assert_eq!(&frame[4..8], &1.0f32.to_le_bytes());
    assert_eq!(&frame[24..28], &0.0f32.to_le_bytes());
    assert_eq!(decode_snapshot(&frame).unwrap(), positions);
}

#[test]
fn empty_snapshot_is_header_only() {
    let frame = encode_snapshot(std::iter::empty::<[f32; 3]>()).unwrap();
    assert_eq!(frame, 0i32.to_le_bytes().to_vec());
    assert!(decode_snapshot(&frame).unwrap().is_empty());
}

#[test]
fn snapshot_decode_rejects_bad_frames() {
    assert_eq!(decode_snapshot(&[1, 0]), Err(CodecError::Truncated(2)));
    assert_eq!(decode_snapshot(&(-1i32).to_le_bytes()), Err(CodecError::NegativeCount(-1)));

    let mut frame = encode_snapshot(vec![[0.0f32; 3]; 3].into_iter()).unwrap();
    frame.pop();
    assert_eq!(
        decode_snapshot(&frame),
        Err(CodecError::LengthMismatch { expected: codec::frame_len(3), actual: codec::frame_len(3) - 1 })
    );
}

// ==================================================================================
// Message tests
// ==================================================================================

#[test]
fn decode_init() {
    let msg = messages::decode(r#"{"type":"init","mode":"gpu","bodyCount":5000,"scenario":"galaxy_collision"}"#).unwrap();
    match msg {
        ControlMessage::Init(init) => {
            assert_eq!(init.mode, Mode::Gpu);
            assert_eq!(init.body_count, 5000);
            assert_eq!(init.scenario, ScenarioKind::GalaxyCollision);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn decode_control_commands() {
    let cases = [
        (r#"{"type":"control","command":"play"}"#, ControlCommand::Play),
        (r#"{"type":"control","command":"pause"}"#, ControlCommand::Pause),
        (r#"{"type":"control","command":"step"}"#, ControlCommand::Step),
        (r#"{"type":"control","command":"reset"}"#, ControlCommand::Reset),
        (r#"{"type":"control","command":"speed","speed":2.5}"#, ControlCommand::Speed { speed: 2.5 }),
    ];
    for (text, expected) in cases {
        assert_eq!(messages::decode(text).unwrap(), ControlMessage::Control(expected), "{text}");
    }
}

#[test]
fn decode_params_subset() {
    let msg = messages::decode(r#"{"type":"params","theta":0.8,"dt":0.02}"#).unwrap();
    assert_eq!(
        msg,
        ControlMessage::Params(ParamsUpdate { theta: Some(0.8), dt: Some(0.02), ..Default::default() })
    );
}

#[test]
fn decode_add_bodies_defaults() {
    let msg = messages::decode(r#"{"type":"addBodies","x":1.5,"y":-2.0}"#).unwrap();
    assert_eq!(
        msg,
        ControlMessage::AddBodies(AddBodiesRequest {
            x: 1.5,
            y: -2.0,
            z: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            count: 100,
            radius: 50.0,
        })
    );
}

#[test]
fn unknown_type_is_ignored() {
    assert_eq!(messages::decode(r#"{"type":"chat","text":"hi"}"#).unwrap(), ControlMessage::Unknown);
}

#[test]
fn invalid_messages_are_rejected() {
    assert!(matches!(messages::decode("{not json"), Err(MessageError::Json(_))));
    assert!(matches!(messages::decode(r#"{"mode":"cpu"}"#), Err(MessageError::Json(_))));

    for text in [
        r#"{"type":"init","mode":"cpu","bodyCount":0,"scenario":"disk"}"#,
        r#"{"type":"control","command":"speed","speed":-1.0}"#,
        r#"{"type":"addBodies","x":0,"y":0,"count":0}"#,
        r#"{"type":"addBodies","x":0,"y":0,"radius":0}"#,
    ] {
        assert!(matches!(messages::decode(text), Err(MessageError::Invalid(_))), "{text}");
    }
}

// ==================================================================================
// Orchestrator tests
// ==================================================================================

#[tokio::test]
async fn uninitialized_orchestrator_reports_cpu_and_no_frame() {
    let mut orch = Orchestrator::new(settings(), software());
    let state = orch.state_message();

    assert_eq!(state.mode, Mode::Cpu);
    assert_eq!(state.body_count, 0);
    assert!(!state.is_3d);
    assert!(orch.snapshot().await.is_none());
}

#[tokio::test]
async fn init_switches_between_solvers() {
    let mut orch = Orchestrator::new(settings(), software());

    assert_eq!(orch.init(Mode::Cpu, 300, ScenarioKind::Sphere).await, Mode::Cpu);
    assert_eq!(orch.body_count(), 300);
    let frame = decode_snapshot(&orch.snapshot().await.unwrap()).unwrap();
    assert_eq!(frame.len(), 300);
    assert!(frame.iter().all(|p| p[2] == 0.0), "2D frames carry z = 0");

    assert_eq!(orch.init(Mode::Gpu, 400, ScenarioKind::Sphere).await, Mode::Gpu);
    let state = orch.state_message();
    assert_eq!(state.mode, Mode::Gpu);
    assert!(state.is_3d);
    assert_eq!(state.body_count, 400);
    let frame = decode_snapshot(&orch.snapshot().await.unwrap()).unwrap();
    assert_eq!(frame.len(), 400);
    assert!(frame.iter().any(|p| p[2] != 0.0));

    assert_eq!(orch.init(Mode::Cpu, 100, ScenarioKind::Disk).await, Mode::Cpu);
    assert_eq!(orch.body_count(), 100);
    orch.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_gpu_init_falls_back_to_cpu() {
    let mut orch = Orchestrator::new(settings(), unavailable());

    assert_eq!(orch.init(Mode::Gpu, 250, ScenarioKind::GalaxyCollision).await, Mode::Cpu);
    let state = orch.state_message();
    assert_eq!(state.mode, Mode::Cpu);
    assert_eq!(state.body_count, 250);
    assert_eq!(orch.scenario(), ScenarioKind::GalaxyCollision);
}

#[tokio::test]
async fn body_count_is_clamped() {
    let mut orch = Orchestrator::new(settings(), software());
    orch.init(Mode::Cpu, 5000, ScenarioKind::Custom).await;
    assert_eq!(orch.body_count(), 1000);

    orch.inject_bodies(&add_request(100)).await;
    assert_eq!(orch.body_count(), 1000);
}

#[tokio::test]
async fn step_advances_time_and_init_resets_it() {
    let mut orch = Orchestrator::new(settings(), software());
    orch.init(Mode::Cpu, 100, ScenarioKind::Disk).await;
    let before = orch.snapshot().await.unwrap();

    orch.pause();
    for _ in 0..3 {
        assert!(orch.step().await);
    }
    let dt = orch.active_params().dt;
    assert!((orch.sim_time() - 3.0 * dt).abs() < 1e-12);
    assert_ne!(orch.snapshot().await.unwrap(), before);

    orch.reset().await;
    assert_eq!(orch.sim_time(), 0.0);
    assert_eq!(orch.scenario(), ScenarioKind::Disk);
    assert_eq!(orch.body_count(), 200);
}

#[tokio::test]
async fn gpu_steps_advance_device_state() {
    let mut orch = Orchestrator::new(settings(), software());
    orch.init(Mode::Gpu, 128, ScenarioKind::Disk).await;
    let before = orch.snapshot().await.unwrap();

    assert!(orch.step().await);
    assert_ne!(orch.snapshot().await.unwrap(), before);
    assert!(orch.sim_time() > 0.0);
    orch.shutdown().await.unwrap();
}

#[tokio::test]
async fn snapshots_match_the_solver_store() {
    let mut orch = Orchestrator::new(settings(), software());

    orch.init(Mode::Cpu, 150, ScenarioKind::GalaxyCollision).await;
    assert!(orch.step().await);
    let frame = decode_snapshot(&orch.snapshot().await.unwrap()).unwrap();
    let ActiveSolver::Hierarchical(solver) = orch.solver() else {
        panic!("expected the hierarchical solver");
    };
    assert_eq!(orch.solver().scheme(), Some(IntegrationScheme::KickDriftKick));
    let bodies = &solver.system().bodies;
    assert_eq!(frame.len(), bodies.len());
    for (i, (p, b)) in frame.iter().zip(bodies).enumerate() {
        assert_eq!(*p, [b.x.x as f32, b.x.y as f32, 0.0], "body {i}");
    }

    orch.init(Mode::Gpu, 77, ScenarioKind::Sphere).await;
    assert!(orch.step().await);
    orch.inject_bodies(&add_request(5)).await;
    let frame = decode_snapshot(&orch.snapshot().await.unwrap()).unwrap();
    let ActiveSolver::Tiled(solver) = orch.solver() else {
        panic!("expected the tiled solver");
    };
    assert_eq!(orch.solver().scheme(), Some(IntegrationScheme::SemiImplicitEuler));
    let bodies = solver.read_bodies().await;
    assert_eq!(frame.len(), 82);
    assert_eq!(frame.len(), bodies.len());
    for (i, (p, b)) in frame.iter().zip(&bodies).enumerate() {
        assert_eq!(*p, [b.x.x as f32, b.x.y as f32, b.x.z as f32], "body {i}");
    }

    orch.shutdown().await.unwrap();
}

#[tokio::test]
async fn params_route_to_the_active_set() {
    let mut orch = Orchestrator::new(settings(), software());
    orch.init(Mode::Cpu, 50, ScenarioKind::Disk).await;
    orch.set_params(&ParamsUpdate { theta: Some(0.9), g: Some(2.0), ..Default::default() });
    assert_eq!(orch.active_params().theta, 0.9);
    assert_eq!(orch.active_params().g, 2.0);

    orch.init(Mode::Gpu, 50, ScenarioKind::Disk).await;
    // the gpu set is untouched by cpu updates and keeps its theta
    assert_eq!(orch.active_params().g, Parameters::default().g);
    orch.set_params(&ParamsUpdate { theta: Some(0.1), softening: Some(1.5), ..Default::default() });
    assert_eq!(orch.active_params().theta, Parameters::default().theta);
    assert_eq!(orch.active_params().softening, 1.5);

    orch.init(Mode::Cpu, 50, ScenarioKind::Disk).await;
    assert_eq!(orch.active_params().theta, 0.9);
    assert_eq!(orch.active_params().softening, Parameters::default().softening);
    orch.shutdown().await.unwrap();
}

#[tokio::test]
async fn injection_appends_after_existing_bodies() {
    for mode in [Mode::Cpu, Mode::Gpu] {
        let mut orch = Orchestrator::new(settings(), software());
        orch.init(mode, 100, ScenarioKind::Sphere).await;
        let before = decode_snapshot(&orch.snapshot().await.unwrap()).unwrap();

        orch.inject_bodies(&add_request(30)).await;
        assert_eq!(orch.body_count(), 130);

        let after = decode_snapshot(&orch.snapshot().await.unwrap()).unwrap();
        assert_eq!(&after[..100], &before[..], "{mode}");
        for p in &after[100..] {
            let d = ((p[0] - 50.0).powi(2) + (p[1] + 20.0).powi(2)).sqrt();
            assert!(d <= 10.0 + 1e-3, "{mode}: {p:?}");
        }
        orch.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn same_seed_same_trajectory() {
    let mut a = Orchestrator::new(settings(), software());
    let mut b = Orchestrator::new(settings(), software());
    a.init(Mode::Cpu, 150, ScenarioKind::GalaxyCollision).await;
    b.init(Mode::Cpu, 150, ScenarioKind::GalaxyCollision).await;

    for _ in 0..5 {
        a.step().await;
        b.step().await;
    }
    assert_eq!(a.snapshot().await, b.snapshot().await);
}

#[tokio::test]
async fn state_message_json_shape() {
    let mut orch = Orchestrator::new(settings(), software());
    orch.init(Mode::Gpu, 64, ScenarioKind::Disk).await;
    let json: serde_json::Value = serde_json::from_str(&orch.state_message().to_json().unwrap()).unwrap();

    assert_eq!(json["type"], "state");
    assert_eq!(json["mode"], "gpu");
    assert_eq!(json["bodyCount"], 64);
    assert_eq!(json["simTime"], 0.0);
    assert_eq!(json["paused"], false);
    assert_eq!(json["is3D"], true);
    assert!(json["stepsPerSecond"].is_u64());
    for key in ["theta", "g", "dt", "softening"] {
        assert!(json["params"][key].is_f64(), "missing params.{key}");
    }
    orch.shutdown().await.unwrap();
}

// ==================================================================================
// Broadcast tests
// ==================================================================================

#[tokio::test]
async fn closed_subscribers_are_removed_and_full_ones_skipped() {
    let mut subs = Subscribers::new();
    let mut slow = subs.add(1);
    let gone = subs.add(4);
    let mut live = subs.add(4);
    drop(gone);

    let frame = Frame::State(Arc::from("{}"));
    assert_eq!(subs.broadcast(&frame), 2);
    assert_eq!(subs.len(), 2);

    // `slow` is full now and misses this one, `live` still gets it
    assert_eq!(subs.broadcast(&frame), 1);
    assert_eq!(subs.len(), 2);

    assert_eq!(drain(&mut slow).len(), 1);
    assert_eq!(drain(&mut live).len(), 2);
}

fn broadcast_settings() -> BroadcastSettings {
    BroadcastSettings { tick_interval: Duration::from_millis(100), subscriber_buffer: 256 }
}

#[tokio::test(start_paused = true)]
async fn paused_steps_produce_exactly_one_frame_each() {
    let handle = SimulationHandle::spawn(Orchestrator::new(settings(), software()), broadcast_settings());
    let mut sub = handle.subscribe().await.unwrap();

    handle.submit_text(r#"{"type":"control","command":"pause"}"#);
    for _ in 0..3 {
        handle.submit_text(r#"{"type":"control","command":"step"}"#);
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    let frames = drain(&mut sub);
    let snaps = snapshots(&frames);
    assert_eq!(snaps.len(), 3, "exactly the three requested steps");
    assert!(snaps.iter().all(|s| s.len() == 200));
    assert_ne!(snaps[0], snaps[1]);
    assert_ne!(snaps[1], snaps[2]);

    let state = handle.state().await.unwrap();
    assert!(state.paused);
    assert!((state.sim_time - 3.0 * Parameters::default().dt).abs() < 1e-12);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cadence_sends_frames_while_running() {
    let handle = SimulationHandle::spawn(Orchestrator::new(settings(), software()), broadcast_settings());
    let mut sub = handle.subscribe().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1050)).await;
    let running = snapshots(&drain(&mut sub)).len();
    assert!((9..=11).contains(&running), "{running} frames in ~1s at 10 Hz");

    // double speed halves the interval
    handle.submit_text(r#"{"type":"control","command":"speed","speed":2.0}"#);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let fast = snapshots(&drain(&mut sub)).len();
    assert!((19..=21).contains(&fast), "{fast} frames in 1s at 20 Hz");

    // speed 0 halts the cadence
    handle.submit_text(r#"{"type":"control","command":"speed","speed":0.0}"#);
    tokio::time::sleep(Duration::from_millis(10)).await;
    drain(&mut sub);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(snapshots(&drain(&mut sub)).is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn new_subscriber_gets_state_first() {
    let handle = SimulationHandle::spawn(
        Orchestrator::new(OrchestratorSettings { start_paused: true, ..settings() }, software()),
        broadcast_settings(),
    );
    let mut sub = handle.subscribe().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let frames = drain(&mut sub);
    let first = states(&frames);
    assert_eq!(frames.len(), 1);
    assert_eq!(first[0]["bodyCount"], 200);
    assert_eq!(first[0]["paused"], true);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn gpu_init_without_device_reports_cpu_to_subscribers() {
    let handle = SimulationHandle::spawn(
        Orchestrator::new(OrchestratorSettings { start_paused: true, ..settings() }, unavailable()),
        broadcast_settings(),
    );
    let mut sub = handle.subscribe().await.unwrap();

    handle.submit_text(r#"{"type":"init","mode":"gpu","bodyCount":300,"scenario":"sphere"}"#);
    let state = handle.state().await.unwrap();
    assert_eq!(state.mode, Mode::Cpu);
    assert_eq!(state.body_count, 300);

    let frames = drain(&mut sub);
    let reported = states(&frames);
    assert_eq!(reported.len(), 2, "state on connect, state after init");
    assert_eq!(reported[1]["mode"], "cpu");
    assert!(reported.iter().all(|s| s["type"] == "state"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_messages_do_not_disturb_the_service() {
    let handle = SimulationHandle::spawn(
        Orchestrator::new(OrchestratorSettings { start_paused: true, ..settings() }, software()),
        broadcast_settings(),
    );
    handle.submit_text("{not json");
    handle.submit_text(r#"{"type":"control","command":"warp"}"#);
    handle.submit_text(r#"{"type":"mystery"}"#);
    handle.submit(ControlMessage::AddBodies(add_request(25)));

    let state = handle.state().await.unwrap();
    assert_eq!(state.body_count, 225);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_an_active_tiled_solver() {
    let handle = SimulationHandle::spawn(
        Orchestrator::new(OrchestratorSettings { start_paused: true, ..settings() }, software()),
        broadcast_settings(),
    );
    handle.submit_text(r#"{"type":"init","mode":"gpu","bodyCount":100,"scenario":"disk"}"#);
    assert_eq!(handle.state().await.unwrap().mode, Mode::Gpu);

    handle.shutdown().await.unwrap();
    assert!(handle.state().await.is_none(), "service stopped");
}
