use super::{Node, Object};
use classbind_core::{BindResult, ConnectFlags, EngineClass, EngineStatus, engine_class};
use std::time::Duration;

engine_class! {
    /// Counts down and emits `timeout` when it reaches zero.
    ///
    /// Engine timers only advance on the main thread.
    pub struct Timer: "Timer" => Node, inherits [Object];
}

pub mod raw {
    use super::Timer;
    use classbind_core::{BindResult, EngineClass, Frame};

    pub fn set_wait_time(this: &Timer, seconds: f64) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(seconds)?;
        handle
            .runtime()
            .bind("Timer", "set_wait_time")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn get_wait_time(this: &Timer) -> BindResult<f64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<f64>()?;
        handle
            .runtime()
            .bind("Timer", "get_wait_time")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn set_one_shot(this: &Timer, enable: bool) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(enable)?;
        handle
            .runtime()
            .bind("Timer", "set_one_shot")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn is_one_shot(this: &Timer) -> BindResult<bool> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<bool>()?;
        handle
            .runtime()
            .bind("Timer", "is_one_shot")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    /// Starts with `time_sec`, or the wait time if it is not positive.
    pub fn start(this: &Timer, time_sec: f64) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(time_sec)?;
        handle
            .runtime()
            .bind("Timer", "start")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn stop(this: &Timer) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        handle
            .runtime()
            .bind("Timer", "stop")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn is_stopped(this: &Timer) -> BindResult<bool> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<bool>()?;
        handle
            .runtime()
            .bind("Timer", "is_stopped")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_time_left(this: &Timer) -> BindResult<f64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<f64>()?;
        handle
            .runtime()
            .bind("Timer", "get_time_left")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }
}

impl Timer {
    pub fn set_wait_time(&self, wait: Duration) -> BindResult<()> {
        raw::set_wait_time(self, wait.as_secs_f64())
    }

    pub fn wait_time(&self) -> BindResult<Duration> {
        Ok(seconds(raw::get_wait_time(self)?))
    }

    pub fn set_one_shot(&self, enable: bool) -> BindResult<()> {
        raw::set_one_shot(self, enable)
    }

    pub fn is_one_shot(&self) -> BindResult<bool> {
        raw::is_one_shot(self)
    }

    /// Starts counting down from the configured wait time.
    pub fn start(&self) -> BindResult<()> {
        raw::start(self, -1.0)
    }

    /// Sets the wait time to `wait` and starts.
    pub fn start_with(&self, wait: Duration) -> BindResult<()> {
        raw::start(self, wait.as_secs_f64())
    }

    pub fn stop(&self) -> BindResult<()> {
        raw::stop(self)
    }

    pub fn is_stopped(&self) -> BindResult<bool> {
        raw::is_stopped(self)
    }

    pub fn time_left(&self) -> BindResult<Duration> {
        Ok(seconds(raw::get_time_left(self)?))
    }

    /// Runs `callback` on every `timeout`.
    pub fn on_timeout<F>(&self, callback: F) -> BindResult<EngineStatus>
    where
        F: FnMut() + 'static,
    {
        self.on("timeout", ConnectFlags::empty(), callback)
    }

    /// Runs `callback` on the next `timeout` only.
    pub fn on_timeout_once<F>(&self, callback: F) -> BindResult<EngineStatus>
    where
        F: FnMut() + 'static,
    {
        self.on("timeout", ConnectFlags::ONE_SHOT, callback)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
