//! macOS input backend
//!
//! Capture uses a listen-only CGEventTap on a dedicated run-loop thread;
//! synthesis posts CGEvents at the HID tap location.

mod keymap;

use crate::error::{Error, Result};
use crate::input::{
    ButtonAction, InputSink, InputSource, Interest, KeyId, MouseButton, RawEvent, RawInput,
};
use cidre::cg::event::access as cg_access;
use cidre::{cf, cg};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Raw FFI for CGEventPost (not exposed by cidre)
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventPost(tap: u32, event: *const std::ffi::c_void);
}

const HID_EVENT_TAP: u32 = 0;

fn post_event(event: &cg::Event) {
    unsafe {
        CGEventPost(HID_EVENT_TAP, event as *const _ as *const std::ffi::c_void);
    }
}

pub fn has_input_permissions() -> bool {
    cidre::ax::is_process_trusted() && cg_access::listen_preflight()
}

pub fn request_input_permissions() -> bool {
    let ax = cidre::ax::is_process_trusted_with_prompt(true);
    let listen = cg_access::listen_request();
    ax && listen
}

pub fn backend() -> Arc<NativeInput> {
    Arc::new(NativeInput::default())
}

struct TapThread {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

#[derive(Default)]
pub struct NativeInput {
    tap: Mutex<Option<TapThread>>,
    // last pointer position we moved to; clicks are posted there
    pointer: Mutex<(f64, f64)>,
}

impl InputSource for NativeInput {
    fn subscribe(&self, interest: Interest, tx: Sender<RawEvent>) -> Result<()> {
        let mut tap = self.tap.lock();
        if tap.is_some() {
            return Err(Error::Subscription("event tap already running".to_string()));
        }
        if interest.is_empty() {
            return Err(Error::config("nothing to subscribe to"));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let stop1 = stop.clone();
        let thread = thread::Builder::new()
            .name("loopkey-event-tap".to_string())
            .spawn(move || run_event_tap(tx, stop1, interest, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *tap = Some(TapThread { stop, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::Subscription("event tap thread exited".to_string()))
            }
        }
    }

    fn unsubscribe_all(&self) {
        if let Some(tap) = self.tap.lock().take() {
            tap.stop.store(true, Ordering::SeqCst);
            let _ = tap.thread.join();
        }
    }
}

struct TapState {
    tx: Sender<RawEvent>,
}

fn run_event_tap(
    tx: Sender<RawEvent>,
    stop: Arc<AtomicBool>,
    interest: Interest,
    ready: Sender<Result<()>>,
) {
    let mut mask = 0;
    if interest.keyboard {
        mask |= cg::EventType::KEY_DOWN.mask() | cg::EventType::KEY_UP.mask();
    }
    if interest.pointer {
        mask |= cg::EventType::LEFT_MOUSE_UP.mask()
            | cg::EventType::RIGHT_MOUSE_UP.mask()
            | cg::EventType::OHTER_MOUSE_UP.mask()
            | cg::EventType::MOUSE_MOVED.mask()
            | cg::EventType::LEFT_MOUSE_DRAGGED.mask()
            | cg::EventType::RIGHT_MOUSE_DRAGGED.mask()
            | cg::EventType::SCROLL_WHEEL.mask();
    }

    let state = Box::into_raw(Box::new(TapState { tx }));

    let tap = cg::EventTap::new(
        cg::EventTapLocation::Session,
        cg::EventTapPlacement::TailAppend,
        cg::EventTapOpts::LISTEN_ONLY,
        mask,
        tap_callback,
        state,
    );

    let Some(tap) = tap else {
        let _ = ready.send(Err(Error::Subscription(
            "failed to create event tap (Input Monitoring permission?)".to_string(),
        )));
        drop(unsafe { Box::from_raw(state) });
        return;
    };

    let Some(src) = cf::MachPort::run_loop_src(&tap, 0) else {
        let _ = ready.send(Err(Error::Subscription(
            "failed to create run loop source".to_string(),
        )));
        drop(unsafe { Box::from_raw(state) });
        return;
    };

    let rl = cf::RunLoop::current();
    rl.add_src(&src, cf::RunLoopMode::default());
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::Relaxed) {
        cf::RunLoop::run_in_mode(cf::RunLoopMode::default(), 0.05, true);
    }

    rl.remove_src(&src, cf::RunLoopMode::default());
    drop(src);
    drop(tap);
    // the tap no longer references the state once its source is gone
    drop(unsafe { Box::from_raw(state) });
}

extern "C" fn tap_callback(
    _proxy: *mut cg::EventTapProxy,
    event_type: cg::EventType,
    event: &mut cg::Event,
    user_info: *mut TapState,
) -> Option<&cg::Event> {
    let state = unsafe { &*user_info };
    let loc = event.location();
    let (x, y) = (loc.x as i32, loc.y as i32);

    let input = match event_type {
        cg::EventType::KEY_DOWN | cg::EventType::KEY_UP => {
            let code = event.field_i64(cg::EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            let key = KeyId::new(keymap::name_for(code));
            if event_type == cg::EventType::KEY_DOWN {
                Some(RawInput::KeyDown(key))
            } else {
                Some(RawInput::KeyUp(key))
            }
        }

        // a completed press is a click; a double click arrives as two clicks
        cg::EventType::LEFT_MOUSE_UP => Some(click(MouseButton::Left, x, y)),
        cg::EventType::RIGHT_MOUSE_UP => Some(click(MouseButton::Right, x, y)),
        cg::EventType::OHTER_MOUSE_UP => Some(click(MouseButton::Middle, x, y)),

        cg::EventType::MOUSE_MOVED
        | cg::EventType::LEFT_MOUSE_DRAGGED
        | cg::EventType::RIGHT_MOUSE_DRAGGED => Some(RawInput::Move { x, y }),

        cg::EventType::SCROLL_WHEEL => {
            let delta = event.field_i64(cg::EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS1) as i32;
            (delta != 0).then_some(RawInput::Wheel { delta })
        }

        _ => None,
    };

    if let Some(input) = input {
        // never block the tap; a full channel drops the notification
        let _ = state.tx.try_send(RawEvent::now(input));
    }

    Some(event)
}

fn click(button: MouseButton, x: i32, y: i32) -> RawInput {
    RawInput::Button {
        button,
        action: ButtonAction::Click,
        x,
        y,
    }
}

fn cg_button(button: MouseButton) -> (cg::MouseButton, cg::EventType, cg::EventType) {
    match button {
        MouseButton::Left => (
            cg::MouseButton::Left,
            cg::EventType::LEFT_MOUSE_DOWN,
            cg::EventType::LEFT_MOUSE_UP,
        ),
        MouseButton::Right => (
            cg::MouseButton::Right,
            cg::EventType::RIGHT_MOUSE_DOWN,
            cg::EventType::RIGHT_MOUSE_UP,
        ),
        MouseButton::Middle | MouseButton::X | MouseButton::X2 => (
            cg::MouseButton::Center,
            cg::EventType::OHTER_MOUSE_DOWN,
            cg::EventType::OHTER_MOUSE_UP,
        ),
    }
}

impl NativeInput {
    fn press_release(&self, button: MouseButton, times: u8) -> Result<()> {
        let (x, y) = *self.pointer.lock();
        let pos = cg::Point { x, y };
        let (btn, down, up) = cg_button(button);

        for i in 0..times {
            let down_evt = cg::Event::mouse(None, down, pos, btn)
                .ok_or_else(|| Error::Synthesis("failed to create mouse down".to_string()))?;
            post_event(&down_evt);
            thread::sleep(Duration::from_millis(10));
            let up_evt = cg::Event::mouse(None, up, pos, btn)
                .ok_or_else(|| Error::Synthesis("failed to create mouse up".to_string()))?;
            post_event(&up_evt);
            if i + 1 < times {
                thread::sleep(Duration::from_millis(50));
            }
        }
        Ok(())
    }

    fn key(&self, key: &KeyId, down: bool) -> Result<()> {
        let code = keymap::code_for(key.as_str())
            .ok_or_else(|| Error::Synthesis(format!("no key code for '{}'", key)))?;
        let evt = cg::Event::keyboard(None, code, down)
            .ok_or_else(|| Error::Synthesis("failed to create key event".to_string()))?;
        post_event(&evt);
        Ok(())
    }
}

impl InputSink for NativeInput {
    fn key_down(&self, key: &KeyId) -> Result<()> {
        self.key(key, true)
    }

    fn key_up(&self, key: &KeyId) -> Result<()> {
        self.key(key, false)
    }

    fn set_pointer_position(&self, x: i32, y: i32) -> Result<()> {
        let pos = cg::Point {
            x: x as f64,
            y: y as f64,
        };
        let evt = cg::Event::mouse(None, cg::EventType::MOUSE_MOVED, pos, cg::MouseButton::Left)
            .ok_or_else(|| Error::Synthesis("failed to create mouse move".to_string()))?;
        post_event(&evt);
        *self.pointer.lock() = (pos.x, pos.y);
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        self.press_release(button, 1)
    }

    fn double_click(&self, button: MouseButton) -> Result<()> {
        self.press_release(button, 2)
    }

    fn scroll(&self, delta: i32) -> Result<()> {
        // CG takes a signed wheel count; cidre exposes it unsigned
        let evt = cg::Event::wheel_2(None, cg::ScrollEventUnit::Line, delta as u32, 0)
            .ok_or_else(|| Error::Synthesis("failed to create scroll event".to_string()))?;
        post_event(&evt);
        Ok(())
    }
}
