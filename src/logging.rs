// Copyright 2025 dentsusoken
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

/// Initialize the logger with the specified verbosity level
///
/// # Arguments
/// * `verbose` - Verbosity level (0=warn, 1=info, 2=debug, 3+=trace)
pub fn setup_logger(verbose: u8) {
    let env_filter = filter_for(verbose);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(env_filter))
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(true)
        .init();
}

fn filter_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "relaykit=warn",
        1 => "relaykit=info",
        2 => "relaykit=debug",
        _ => "relaykit=trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(filter_for(0), "relaykit=warn");
        assert_eq!(filter_for(1), "relaykit=info");
        assert_eq!(filter_for(2), "relaykit=debug");
        assert_eq!(filter_for(7), "relaykit=trace");
    }
}
