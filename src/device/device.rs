//! Typed device operations built on the command gateway.

use std::time::Duration;

use tracing::{debug, warn};

use crate::device::gateway::{DeviceGateway, GatewayResult};
use crate::ui::{Snapshot, parse};
use crate::wait::{CancelToken, poll_until};

/// Backoff ladder between hierarchy-dump retries.
const DUMP_BACKOFF_MS: [u64; 5] = [500, 1000, 2000, 3000, 5000];

/// Android BACK key, pressed between failed dump attempts to dismiss
/// whatever overlay is blocking uiautomator.
const KEYCODE_BACK: u16 = 4;

/// High-level device operations. Thin wrapper; owns no state beyond the
/// gateway reference, so it is cheap to construct wherever needed.
pub struct Device<'a> {
    gateway: &'a dyn DeviceGateway,
    dump_retries: usize,
}

impl<'a> Device<'a> {
    pub fn new(gateway: &'a dyn DeviceGateway) -> Self {
        Self {
            gateway,
            dump_retries: DUMP_BACKOFF_MS.len(),
        }
    }

    pub fn dump_retries(mut self, retries: usize) -> Self {
        self.dump_retries = retries.max(1);
        self
    }

    pub fn gateway(&self) -> &'a dyn DeviceGateway {
        self.gateway
    }

    /// Dump the accessibility tree, retrying with backoff when the device
    /// returns nothing usable. Returns an empty string after exhausting
    /// retries; parsing that yields an empty snapshot ("no data yet").
    pub fn dump_hierarchy(&self, cancel: &CancelToken) -> GatewayResult<String> {
        for attempt in 0..self.dump_retries {
            let out = self.gateway.run("adb exec-out uiautomator dump /dev/tty")?;
            if out.success && (out.stdout.contains("<?xml") || out.stdout.contains("<node")) {
                return Ok(out.stdout);
            }
            debug!(attempt, "hierarchy dump unusable, backing off");
            self.key_event(KEYCODE_BACK);
            let backoff = DUMP_BACKOFF_MS[attempt.min(DUMP_BACKOFF_MS.len() - 1)];
            if !cancel.sleep(Duration::from_millis(backoff)) {
                break;
            }
        }
        warn!("hierarchy dump unavailable after {} attempts", self.dump_retries);
        Ok(String::new())
    }

    /// Dump and parse the current tree into a labeled snapshot.
    pub fn snapshot(&self, label: &str, cancel: &CancelToken) -> GatewayResult<Snapshot> {
        let raw = self.dump_hierarchy(cancel)?;
        Ok(parse(label, &raw))
    }

    pub fn tap(&self, x: i32, y: i32) -> bool {
        self.gateway
            .run_ok(&format!("adb shell input tap {} {}", x, y))
    }

    /// Type text into the focused field. Spaces are escaped the way
    /// `input text` expects.
    pub fn type_text(&self, text: &str) -> bool {
        let escaped = text.replace(' ', "%s");
        self.gateway
            .run_ok(&format!("adb shell input text \"{}\"", escaped))
    }

    pub fn key_event(&self, code: u16) -> bool {
        self.gateway
            .run_ok(&format!("adb shell input keyevent {}", code))
    }

    /// Launch an activity and wait for the launch to complete.
    pub fn launch_activity(&self, component: &str) -> bool {
        self.gateway
            .run_ok(&format!("adb shell am start -W -n {}", component))
    }

    /// Deliver a text share intent to the given component.
    pub fn share_text(&self, component: &str, text: &str) -> bool {
        self.gateway.run_ok(&format!(
            "adb shell am start -a android.intent.action.SEND -t text/plain --es android.intent.extra.TEXT \"{}\" -n {}",
            text, component
        ))
    }

    /// Whether the package currently owns the focused window.
    pub fn is_app_focused(&self, package: &str) -> bool {
        let Ok(out) = self.gateway.run("adb shell dumpsys window windows") else {
            return false;
        };
        out.stdout.lines().any(|line| {
            (line.contains("mCurrentFocus") || line.contains("mFocusedApp"))
                && line.contains(package)
        })
    }

    /// Poll until the package owns window focus, to avoid acting on the
    /// first empty frame after a launch.
    pub fn wait_until_focused(
        &self,
        package: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> bool {
        poll_until(
            || self.is_app_focused(package).then_some(()),
            timeout,
            Duration::from_millis(300),
            cancel,
        )
        .found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::gateway::ScriptedGateway;

    #[test]
    fn test_dump_hierarchy_retries_then_succeeds() {
        let gateway = ScriptedGateway::new()
            .stub("uiautomator dump", "ERROR: null root node")
            .stub("uiautomator dump", "<?xml?><node class=\"a\" bounds=\"[0,0][1,1]\"/>");
        let device = Device::new(&gateway);

        let dump = device.dump_hierarchy(&CancelToken::new()).unwrap();
        assert!(dump.contains("<node"));
        // The failed first attempt pressed BACK to clear overlays.
        assert!(gateway.saw("keyevent 4"));
    }

    #[test]
    fn test_dump_hierarchy_gives_up_empty() {
        let gateway = ScriptedGateway::new().stub("uiautomator dump", "no xml here");
        let device = Device::new(&gateway).dump_retries(2);

        let dump = device.dump_hierarchy(&CancelToken::new()).unwrap();
        assert!(dump.is_empty());
    }

    #[test]
    fn test_type_text_escapes_spaces() {
        let gateway = ScriptedGateway::new();
        let device = Device::new(&gateway);
        assert!(device.type_text("hello world"));
        assert!(gateway.saw("input text \"hello%sworld\""));
    }

    #[test]
    fn test_is_app_focused() {
        let gateway = ScriptedGateway::new().stub(
            "dumpsys window windows",
            "  mCurrentFocus=Window{abc u0 com.example.capture/com.example.capture.MainActivity}",
        );
        let device = Device::new(&gateway);
        assert!(device.is_app_focused("com.example.capture"));
        assert!(!device.is_app_focused("com.other.app"));
    }
}
