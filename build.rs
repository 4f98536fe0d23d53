// Copyright 2026 The rfbpipe Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::env;

fn main() {
    // Only the turbojpeg feature links against native code.
    if env::var_os("CARGO_FEATURE_TURBOJPEG").is_none() {
        return;
    }

    // libjpeg-turbo ships a pkg-config file on the platforms we target;
    // probing it emits the search-path and link directives. Installs
    // without one (or without pkg-config itself) still link through the
    // `#[link]` attribute on the FFI block, with the library expected on
    // the default linker path.
    if let Err(e) = pkg_config::Config::new().probe("libturbojpeg") {
        println!("cargo:warning=libturbojpeg not found via pkg-config ({e}); relying on the default linker search path");
    }
}
