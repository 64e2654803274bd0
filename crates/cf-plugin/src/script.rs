//! Lua-scripted plugins
//!
//! One dedicated thread owns the interpreter; callers talk to it through a
//! request channel with one-shot reply channels. Compiled module tables are
//! cached on the host thread keyed by integer id, so a script is compiled
//! once per plugin instance regardless of how many frames it sees.
//!
//! A script module is a chunk evaluating to a table:
//!
//! ```lua
//! local M = {}
//! function M.process(frame)
//!   return { detect = frame.frame_num % 2 == 0, items = {} }
//! end
//! return M
//! ```
//!
//! `process` is required for detectors; `set_attrs` and `info` are optional.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use log::{debug, warn};
use mlua::{Lua, Table, Value as LuaValue};

use cf_core::{DetectionItem, Error, FrameDesc, FramePack, Outcome, Rect, Result};

use crate::traits::ProcessPlugin;
use crate::types::AttrMap;

enum ScriptRequest {
    Create {
        id: u64,
        name: String,
        source: String,
        reply: Sender<Result<()>>,
    },
    Info {
        id: u64,
        reply: Sender<Result<AttrMap>>,
    },
    SetAttrs {
        id: u64,
        attrs: AttrMap,
        reply: Sender<Result<()>>,
    },
    Process {
        id: u64,
        frame: FramePack,
        reply: Sender<Result<Outcome>>,
    },
    Remove {
        id: u64,
    },
    Shutdown,
}

/// Handle to the interpreter thread.
pub struct ScriptHost {
    tx: Sender<ScriptRequest>,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl ScriptHost {
    /// Spawn the interpreter thread.
    pub fn new() -> Result<Self> {
        let (tx, rx) = unbounded::<ScriptRequest>();

        let worker = thread::Builder::new()
            .name("cf-script-host".into())
            .spawn(move || {
                let lua = Lua::new();
                let mut modules: HashMap<u64, Table> = HashMap::new();

                for request in rx.iter() {
                    match request {
                        ScriptRequest::Create {
                            id,
                            name,
                            source,
                            reply,
                        } => {
                            let result = compile_module(&lua, &name, &source).map(|module| {
                                debug!("script module {name} compiled as #{id}");
                                modules.insert(id, module);
                            });
                            let _ = reply.send(result);
                        }
                        ScriptRequest::Info { id, reply } => {
                            let _ = reply.send(module_info(&modules, id));
                        }
                        ScriptRequest::SetAttrs { id, attrs, reply } => {
                            let _ = reply.send(module_set_attrs(&lua, &modules, id, &attrs));
                        }
                        ScriptRequest::Process { id, frame, reply } => {
                            let _ = reply.send(module_process(&lua, &modules, id, &frame));
                        }
                        ScriptRequest::Remove { id } => {
                            modules.remove(&id);
                        }
                        ScriptRequest::Shutdown => break,
                    }
                }
            })
            .map_err(|e| Error::InvalidOperation(format!("script host spawn: {e}")))?;

        Ok(Self {
            tx,
            next_id: AtomicU64::new(1),
            worker: Some(worker),
        })
    }

    /// Compile `source` as a module, returning its handle id.
    pub fn create(&self, name: &str, source: &str) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, result) = bounded(1);
        self.send(ScriptRequest::Create {
            id,
            name: name.to_string(),
            source: source.to_string(),
            reply,
        })?;
        self.recv(result)?;
        Ok(id)
    }

    /// Info map reported by the module's `info()` function.
    pub fn plugin_info(&self, id: u64) -> Result<AttrMap> {
        let (reply, result) = bounded(1);
        self.send(ScriptRequest::Info { id, reply })?;
        self.recv(result)
    }

    pub fn set_attrs(&self, id: u64, attrs: &AttrMap) -> Result<()> {
        let (reply, result) = bounded(1);
        self.send(ScriptRequest::SetAttrs {
            id,
            attrs: attrs.clone(),
            reply,
        })?;
        self.recv(result)
    }

    pub fn process(&self, id: u64, frame: &FramePack) -> Result<Outcome> {
        let (reply, result) = bounded(1);
        self.send(ScriptRequest::Process {
            id,
            frame: frame.clone(),
            reply,
        })?;
        self.recv(result)
    }

    pub fn remove(&self, id: u64) {
        let _ = self.tx.send(ScriptRequest::Remove { id });
    }

    fn send(&self, request: ScriptRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| Error::InvalidOperation("script host is gone".into()))
    }

    fn recv<T>(&self, rx: crossbeam_channel::Receiver<Result<T>>) -> Result<T> {
        rx.recv()
            .map_err(|_| Error::InvalidOperation("script host dropped reply".into()))?
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        let _ = self.tx.send(ScriptRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("script host thread panicked");
            }
        }
    }
}

/// Detector backed by a script module.
pub struct ScriptProcessPlugin {
    host: Arc<ScriptHost>,
    id: u64,
}

impl ScriptProcessPlugin {
    /// Compile `source` on `host` and wrap the module as a detector.
    pub fn new(host: Arc<ScriptHost>, name: &str, source: &str) -> Result<Self> {
        let id = host.create(name, source)?;
        Ok(Self { host, id })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl ProcessPlugin for ScriptProcessPlugin {
    fn process(&mut self, frame: &FramePack) -> Result<Outcome> {
        self.host.process(self.id, frame)
    }

    fn set_attrs(&mut self, attrs: &AttrMap) -> Result<()> {
        self.host.set_attrs(self.id, attrs)
    }
}

impl Drop for ScriptProcessPlugin {
    fn drop(&mut self) {
        self.host.remove(self.id);
    }
}

fn lua_err(e: mlua::Error) -> Error {
    Error::InvalidOperation(format!("lua: {e}"))
}

fn compile_module(lua: &Lua, name: &str, source: &str) -> Result<Table> {
    lua.load(source)
        .set_name(name)
        .eval::<Table>()
        .map_err(lua_err)
}

fn module<'a>(modules: &'a HashMap<u64, Table>, id: u64) -> Result<&'a Table> {
    modules
        .get(&id)
        .ok_or_else(|| Error::InvalidParameter(format!("no script module: #{id}")))
}

fn module_info(modules: &HashMap<u64, Table>, id: u64) -> Result<AttrMap> {
    let module = module(modules, id)?;
    let mut info = AttrMap::new();

    let func: LuaValue = module.get("info").map_err(lua_err)?;
    if let LuaValue::Function(func) = func {
        let table: Table = func.call(()).map_err(lua_err)?;
        for pair in table.pairs::<String, String>() {
            let (key, value) = pair.map_err(lua_err)?;
            info.insert(key, value);
        }
    }
    Ok(info)
}

fn module_set_attrs(
    lua: &Lua,
    modules: &HashMap<u64, Table>,
    id: u64,
    attrs: &AttrMap,
) -> Result<()> {
    let module = module(modules, id)?;
    let func: LuaValue = module.get("set_attrs").map_err(lua_err)?;
    let LuaValue::Function(func) = func else {
        return Ok(());
    };

    let table = lua.create_table().map_err(lua_err)?;
    for (key, value) in attrs {
        table.set(key.as_str(), value.as_str()).map_err(lua_err)?;
    }
    func.call::<()>(table).map_err(lua_err)
}

fn module_process(
    lua: &Lua,
    modules: &HashMap<u64, Table>,
    id: u64,
    frame: &FramePack,
) -> Result<Outcome> {
    let module = module(modules, id)?;
    let func: mlua::Function = module.get("process").map_err(lua_err)?;
    let frame_table = frame_to_table(lua, frame).map_err(lua_err)?;
    let result: Table = func.call(frame_table).map_err(lua_err)?;
    table_to_outcome(result)
}

fn frame_to_table(lua: &Lua, frame: &FramePack) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("frame_num", frame.frame_num())?;
    table.set("pts", frame.pts())?;
    table.set("framerate", frame.framerate())?;
    table.set("total_frames", frame.total_frames())?;
    match frame.desc() {
        FrameDesc::Video(v) => {
            table.set("media", "video")?;
            table.set("width", v.width)?;
            table.set("height", v.height)?;
        }
        FrameDesc::Audio(a) => {
            table.set("media", "audio")?;
            table.set("channels", a.channels)?;
            table.set("sample_rate", a.sample_rate)?;
            table.set("samples", a.samples)?;
        }
    }
    table.set("data", lua.create_string(frame.data())?)?;
    Ok(table)
}

fn table_to_outcome(table: Table) -> Result<Outcome> {
    let detect: bool = table.get("detect").map_err(lua_err)?;
    let mut items = Vec::new();

    let list: LuaValue = table.get("items").map_err(lua_err)?;
    if let LuaValue::Table(list) = list {
        for entry in list.sequence_values::<LuaValue>() {
            let entry = entry.map_err(lua_err)?;
            items.push(value_to_item(entry)?);
        }
    }
    Ok(Outcome::new(detect, items))
}

fn value_to_item(value: LuaValue) -> Result<DetectionItem> {
    match value {
        LuaValue::Boolean(b) => Ok(DetectionItem::Flag(b)),
        LuaValue::Number(n) => Ok(DetectionItem::Scalar(n)),
        LuaValue::Integer(n) => Ok(DetectionItem::Scalar(n as f64)),
        LuaValue::Table(t) => {
            let rect = Rect::new(
                t.get("x").map_err(lua_err)?,
                t.get("y").map_err(lua_err)?,
                t.get("width").map_err(lua_err)?,
                t.get("height").map_err(lua_err)?,
            );
            let tag: Option<String> = t.get("tag").map_err(lua_err)?;
            Ok(match tag {
                Some(tag) => DetectionItem::RectTag { rect, tag },
                None => DetectionItem::Rect(rect),
            })
        }
        other => Err(Error::InvalidParameter(format!(
            "unsupported detection item from script: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{VideoDesc, VideoFormat};

    fn gray_frame(n: u64) -> FramePack {
        let desc = VideoDesc {
            width: 2,
            height: 2,
            format: VideoFormat::Gray8,
        };
        FramePack::video(desc, vec![0u8; 4], n, n as f64 / 30.0, 30.0, 10).unwrap()
    }

    const EVEN_FRAMES: &str = r#"
        local M = {}
        M.threshold = "0"
        function M.info()
          return { name = "even_frames" }
        end
        function M.set_attrs(attrs)
          M.threshold = attrs.threshold or "0"
        end
        function M.process(frame)
          local hit = frame.frame_num % 2 == 0
          local items = {}
          if hit then
            items[1] = { x = 0, y = 0, width = 1, height = 1 }
          end
          return { detect = hit, items = items }
        end
        return M
    "#;

    #[test]
    fn test_script_module_roundtrip() {
        let host = Arc::new(ScriptHost::new().unwrap());
        let mut plugin = ScriptProcessPlugin::new(host.clone(), "even_frames", EVEN_FRAMES).unwrap();

        let info = host.plugin_info(plugin.id()).unwrap();
        assert_eq!(info.get("name").map(String::as_str), Some("even_frames"));

        let odd = plugin.process(&gray_frame(1)).unwrap();
        assert!(!odd.detect);
        assert!(odd.items.is_empty());

        let even = plugin.process(&gray_frame(2)).unwrap();
        assert!(even.detect);
        assert_eq!(even.items.len(), 1);
        assert!(matches!(even.items[0], DetectionItem::Rect(_)));
    }

    #[test]
    fn test_script_set_attrs() {
        let host = Arc::new(ScriptHost::new().unwrap());
        let mut plugin = ScriptProcessPlugin::new(host, "even_frames", EVEN_FRAMES).unwrap();

        let mut attrs = AttrMap::new();
        attrs.insert("threshold".into(), "0.5".into());
        assert!(plugin.set_attrs(&attrs).is_ok());
    }

    #[test]
    fn test_bad_script_fails_to_compile() {
        let host = Arc::new(ScriptHost::new().unwrap());
        assert!(ScriptProcessPlugin::new(host, "broken", "this is not lua").is_err());
    }
}
