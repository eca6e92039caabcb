//! Client registry: an ES module with the global includes first, then one
//! import per compiled component, its registration and the default export.
//!
//! ```js
//! import * as riot from 'riot';
//! import * as runtime from '@frontless/riot';
//!
//! import home from './views/page/home.riot.js';
//!
//! const exporting = {};
//!
//! exporting['home'] = home;
//! runtime.register('home', home);
//!
//! export default exporting;
//! ```

use std::fmt::Write;

use super::naming::js_string;
use super::{HEADER, Include, Registry};

pub fn render(registry: &Registry, runtime: &str, includes: &[Include]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    out.push('\n');

    for include in includes {
        let _ = writeln!(out, "import * as {} from {};", include.name, js_string(&include.path));
    }
    let _ = writeln!(out, "import * as runtime from {};", js_string(runtime));
    out.push('\n');

    for entry in registry.entries() {
        let _ = writeln!(out, "import {} from {};", entry.ident, js_string(&entry.module));
    }
    if !registry.entries().is_empty() {
        out.push('\n');
    }

    out.push_str("const exporting = {};\n\n");

    for entry in registry.entries() {
        let _ = writeln!(out, "exporting[{}] = {};", js_string(&entry.name), entry.ident);
    }
    for entry in registry.entries() {
        let _ = writeln!(out, "runtime.register({}, {});", js_string(&entry.name), entry.ident);
    }
    if !registry.entries().is_empty() {
        out.push('\n');
    }

    out.push_str("export default exporting;\n");
    out
}
