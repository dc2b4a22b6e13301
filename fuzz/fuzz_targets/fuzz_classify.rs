#![no_main]
use libfuzzer_sys::fuzz_target;
use tollgate_core::event::ExecutionEvent;
use tollgate_engine::classify::Classifier;
use tollgate_engine::gates::packages::extract_packages;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let classifier = Classifier::builtin();
        let _ = classifier.classify(&ExecutionEvent::shell(s, "/work"));
        let _ = classifier.classify(&ExecutionEvent::file_write(s, "/work"));
        let _ = extract_packages(s);
    }
});
