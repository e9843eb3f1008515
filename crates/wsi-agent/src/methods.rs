//! Built-in methods.

use serde_json::Value;
use wsi_rpc::{MethodRegistry, Request};

/// Register `ping`, `echo`, `whoami` and `system.methods`.
///
/// `system.methods` reports the registry as it stands when this is called.
pub fn register_builtins(registry: &mut MethodRegistry) {
    registry.register_fn(
        "ping",
        |req: Request| async move {
            let _ = req.reply("pong");
        },
        false,
    );

    registry.register_fn(
        "echo",
        |req: Request| async move {
            let params = req.field("params").cloned().unwrap_or(Value::Null);
            let _ = req.reply(params);
        },
        false,
    );

    registry.register_fn(
        "whoami",
        |req: Request| async move {
            let claims = req.token.clone().unwrap_or_default();
            let _ = req.reply(claims);
        },
        true,
    );

    let mut names = registry.methods();
    names.push("system.methods".to_owned());
    names.sort();
    registry.register_fn(
        "system.methods",
        move |req: Request| {
            let names = names.clone();
            async move {
                let _ = req.reply(names);
            }
        },
        false,
    );
}
