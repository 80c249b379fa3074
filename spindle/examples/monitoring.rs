//! Demonstrates context configuration and lifecycle event monitoring.
//!
//! Run with `RUST_LOG=spindle_core=debug` to see registry logs as well.

use std::time::Duration;

use spindle::prelude::*;

fn main() -> spindle::Result<()> {
    spindle::dev_tracing::init_tracing();

    let ctx = Context::with_options(&ContextOptions::new().with_io_threads(2).with_ipv6(true))?;
    println!("Socket Monitor Example");
    println!("======================\n");
    println!(
        "io_threads={} ipv6={} socket_limit={}",
        ctx.io_threads()?,
        ctx.ipv6()?,
        ctx.socket_limit()?
    );

    ctx.monitor(|event| {
        println!("  event: {event}");
        // observers run on the delivery thread; keep them short
        std::thread::sleep(Duration::from_millis(1));
    })?;

    let router = ctx.router()?;
    router.bind("tcp://127.0.0.1:5555")?;

    let dealer = ctx.dealer()?;
    dealer.set_send_hwm(100)?;
    dealer.connect("tcp://127.0.0.1:5555")?;

    let push = ctx.push()?;
    push.connect("inproc://nowhere")?;

    dealer.disconnect("tcp://127.0.0.1:5555")?;
    drop(push);

    println!("\nclosing context");
    ctx.close()?;

    match router.bind("tcp://127.0.0.1:5556") {
        Err(SpindleError::InvalidHandle(h)) => println!("router {h} is gone with its context"),
        other => println!("unexpected: {other:?}"),
    }
    Ok(())
}
