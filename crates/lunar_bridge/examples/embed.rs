//! Embedding walkthrough
//!
//! **This shows:**
//! - Evaluating lua and reading results on the host
//! - Holding lua functions and tables across calls
//! - Calling host closures and objects from lua
//! - Catching host failures with `pcall`

use lunar_bridge::{HostFunction, HostValue, Namespace, Session};
use std::rc::Rc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Lunar Bridge: embedding ===\n");

    let session = Session::new()?;
    session.open_libraries()?;

    println!("1. Globals");
    session.eval("a = 5")?;
    println!("   a = {}", session.get_global("a")?);
    session.set_global("a", HostValue::Int(9))?;
    println!("   a = {} (set from host)\n", session.eval("return a")?[0]);

    println!("2. Lua functions on the host");
    session.eval("function pair(x, y) return x, y end")?;
    let pair = session.get_global("pair")?;
    let pair = pair.as_function().ok_or("pair is not a function")?;
    println!("   pair(5)       -> {:?}", pair.invoke([5.into()])?);
    println!("   pair(5, 6, 8) -> {:?}\n", pair.invoke([5.into(), 6.into(), 8.into()])?);

    println!("3. Host functions in lua");
    session.register_function("pydouble", |args| {
        let x = args.first().and_then(HostValue::as_float).unwrap_or(0.0);
        Ok(vec![HostValue::Float(2.0 * x)])
    })?;
    println!("   pydouble(4) -> {}", session.eval("return pydouble(4)")?[0]);

    session.register_function("explode", |_| anyhow::bail!("host refused"))?;
    let caught = session.eval("local ok, err = pcall(explode) return ok, 'caught: ' .. err")?;
    println!("   pcall(explode) -> {}, {}\n", caught[0], caught[1]);

    println!("4. Host objects in lua");
    let player = Rc::new(
        Namespace::new("Player")
            .with("name", "ada")
            .with("score", 0)
            .with(
                "shout",
                HostFunction::new("shout", |args| {
                    let text = args.first().and_then(HostValue::as_str).unwrap_or("");
                    Ok(vec![text.to_uppercase().into()])
                }),
            ),
    );
    session.expose_object("player", player.clone())?;
    session.eval("player.score = player.score + 10")?;
    println!("   score seen by host: {:?}", player.get("score"));
    println!("   player:shout('hi') -> {}\n", session.eval("return player:shout('hi')")?[0]);

    println!("5. Bookkeeping");
    session.collect_garbage()?;
    println!("   {:?}", session.stats());

    Ok(())
}
