//! Host functions available to scripts as the `host` global

use anyhow::bail;
use lunar_bridge::{BridgeError, HostFunction, HostValue, Namespace, Session};
use std::rc::Rc;

pub fn install(session: &Session) -> Result<(), BridgeError> {
    let host = Namespace::new("host")
        .with("version", lunar_bridge::VERSION)
        .with("log", HostFunction::new("log", log))
        .with("env", HostFunction::new("env", env));
    session.expose_object("host", Rc::new(host))
}

fn log(args: Vec<HostValue>) -> anyhow::Result<Vec<HostValue>> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    tracing::info!(target: "lunar::script", "{line}");
    Ok(vec![])
}

fn env(args: Vec<HostValue>) -> anyhow::Result<Vec<HostValue>> {
    let Some(name) = args.first().and_then(HostValue::as_str) else {
        bail!("host.env expects a variable name");
    };
    Ok(vec![std::env::var(name).ok().into()])
}
