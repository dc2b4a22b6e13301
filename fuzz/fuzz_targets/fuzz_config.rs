#![no_main]
use libfuzzer_sys::fuzz_target;
use tollgate_core::config::TollgateConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let report = tollgate_core::schema::check(&value, "fuzz.json", false);
    if report.pass {
        // Whatever the checker accepts, the loader must accept too.
        assert!(serde_json::from_value::<TollgateConfig>(value).is_ok());
    }
});
