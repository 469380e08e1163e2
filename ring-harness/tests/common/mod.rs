// ring-harness/tests/common/mod.rs

// Fake ring DHT nodes: one warp server per node on an ephemeral localhost port, all
// backed by one shared RingModel. Each node answers the same control surface a real
// node exposes.

#![allow(dead_code)]

use ring_harness::test_utils::{ModelError, RingModel};
use ring_harness::{HarnessConfig, NodeAddr};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

pub type SharedModel = Arc<Mutex<RingModel>>;

#[derive(Clone)]
struct FakeNode {
    model: SharedModel,
    me: Arc<OnceLock<NodeAddr>>, // Known only once the listener is bound
}

impl FakeNode {
    fn with<R>(&self, f: impl FnOnce(&mut RingModel, &NodeAddr) -> Result<R, ModelError>) -> Result<R, ModelError> {
        let me = self.me.get().ok_or(ModelError::Rejected(500))?;
        f(&mut self.model.lock().unwrap(), me)
    }
}

fn status_of(err: &ModelError) -> StatusCode {
    match err {
        ModelError::Unreachable => StatusCode::BAD_GATEWAY,
        ModelError::Crashed => StatusCode::SERVICE_UNAVAILABLE,
        ModelError::Rejected(code) => StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ModelError::NotFound => StatusCode::NOT_FOUND,
    }
}

fn admin_reply(result: Result<(), ModelError>) -> Response {
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => status_of(&e).into_response(),
    }
}

fn routes(node: FakeNode) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let ctx = warp::any().map(move || node.clone());

    let join = warp::post()
        .and(warp::path!("join"))
        .and(warp::query::<HashMap<String, String>>())
        .and(ctx.clone())
        .map(|q: HashMap<String, String>, n: FakeNode| {
            let nprime = match q.get("nprime").and_then(|s| s.parse::<NodeAddr>().ok()) {
                Some(addr) => addr,
                None => return StatusCode::BAD_REQUEST.into_response(),
            };
            admin_reply(n.with(|m, me| m.join(me, &nprime)))
        });

    let leave = warp::post()
        .and(warp::path!("leave"))
        .and(ctx.clone())
        .map(|n: FakeNode| admin_reply(n.with(|m, me| m.leave(me))));

    let crash = warp::post()
        .and(warp::path!("sim-crash"))
        .and(ctx.clone())
        .map(|n: FakeNode| admin_reply(n.with(|m, me| m.crash(me))));

    let recover = warp::post()
        .and(warp::path!("sim-recover"))
        .and(ctx.clone())
        .map(|n: FakeNode| admin_reply(n.with(|m, me| m.recover(me))));

    let info = warp::get()
        .and(warp::path!("node-info"))
        .and(ctx.clone())
        .map(|n: FakeNode| match n.with(|m, me| m.info(me)) {
            Ok(info) => warp::reply::json(&info).into_response(),
            Err(e) => status_of(&e).into_response(),
        });

    let put = warp::put()
        .and(warp::path!("storage" / String))
        .and(warp::body::bytes())
        .and(ctx.clone())
        .map(|key: String, body: warp::hyper::body::Bytes, n: FakeNode| {
            let value = String::from_utf8_lossy(&body).into_owned();
            match n.with(|m, me| m.put(me, &key, &value)) {
                Ok(()) => StatusCode::CREATED.into_response(),
                Err(e) => status_of(&e).into_response(),
            }
        });

    let get = warp::get()
        .and(warp::path!("storage" / String))
        .and(ctx.clone())
        .map(|key: String, n: FakeNode| match n.with(|m, me| m.get(me, &key)) {
            Ok(value) => value.into_response(),
            Err(e) => status_of(&e).into_response(),
        });

    let shutdown = warp::path!("shutdown").and(ctx).map(|n: FakeNode| {
        let _ = n.with(|m, me| {
            m.shutdown(me);
            Ok(())
        });
        StatusCode::OK.into_response()
    });

    join.or(leave)
        .unify()
        .or(crash)
        .unify()
        .or(recover)
        .unify()
        .or(info)
        .unify()
        .or(put)
        .unify()
        .or(get)
        .unify()
        .or(shutdown)
        .unify()
}

pub struct FakeCluster {
    pub addrs: Vec<NodeAddr>,
    pub model: SharedModel,
}

impl FakeCluster {
    pub fn with_model<R>(&self, f: impl FnOnce(&mut RingModel) -> R) -> R {
        f(&mut self.model.lock().unwrap())
    }
}

/// Starts `n` fake nodes. The first one is the introducer and the only initial member.
pub async fn spawn_cluster(n: usize) -> FakeCluster {
    let model: SharedModel = Arc::new(Mutex::new(RingModel::default()));
    let mut addrs = Vec::with_capacity(n);

    for _ in 0..n {
        let me = Arc::new(OnceLock::new());
        let node = FakeNode { model: model.clone(), me: me.clone() };
        let (socket, server) = warp::serve(routes(node)).bind_ephemeral(([127, 0, 0, 1], 0));
        let addr: NodeAddr = socket.to_string().parse().unwrap();
        me.set(addr.clone()).unwrap();
        tokio::spawn(server);
        addrs.push(addr);
    }

    *model.lock().unwrap() = RingModel::new(&addrs[0]);
    FakeCluster { addrs, model }
}

/// Real-time settings small enough for tests over localhost.
pub fn fast_config() -> HarnessConfig {
    HarnessConfig {
        request_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(50),
        stabilize_deadline: Duration::from_secs(2),
        settle_duration: Duration::from_millis(100),
        fault_confirm_delay: Duration::from_millis(20),
        seed: Some(7),
        node_counts: vec![2, 4],
        repeats: 2,
        ..Default::default()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
