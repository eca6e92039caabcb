//! Server registry: a CommonJS module that requires every compiled
//! component, registers it with the runtime and exports the name mapping.
//!
//! ```js
//! const runtime = require('@frontless/riot');
//! const exporting = {};
//!
//! exporting['home'] = require('./views/page/home.riot.js'); runtime.register('home', exporting['home']);
//!
//! module.exports = exporting;
//! ```

use std::fmt::Write;

use super::naming::js_string;
use super::{HEADER, Registry};

pub fn render(registry: &Registry, runtime: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    out.push('\n');
    let _ = writeln!(out, "const runtime = require({});", js_string(runtime));
    out.push_str("const exporting = {};\n\n");

    for entry in registry.entries() {
        let name = js_string(&entry.name);
        let _ = writeln!(
            out,
            "exporting[{name}] = require({}); runtime.register({name}, exporting[{name}]);",
            js_string(&entry.module)
        );
    }

    if !registry.entries().is_empty() {
        out.push('\n');
    }
    out.push_str("module.exports = exporting;\n");
    out
}
