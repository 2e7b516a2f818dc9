use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use crate::engine::Engine;

pub struct StateInitializationEvent(Engine);

pub enum State {
    Uninitialized,
    Initializing,
    Initialized(Engine),
}

pub struct Application {
    application_state: State,
    event_loop_proxy: EventLoopProxy<StateInitializationEvent>,
}

impl Application {
    pub fn new(event_loop: &EventLoop<StateInitializationEvent>) -> Application {
        Application {
            application_state: State::Uninitialized,
            event_loop_proxy: event_loop.create_proxy(),
        }
    }
}

impl ApplicationHandler<StateInitializationEvent> for Application {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match self.application_state {
            State::Initializing | State::Initialized(_) => return,
            State::Uninitialized => {
                self.application_state = State::Initializing;
            }
        }

        let window_attributes = Window::default_attributes().with_title("Hybrid Ray Tracer");
        let window = Arc::new(event_loop.create_window(window_attributes).unwrap());

        match pollster::block_on(Engine::new(window)) {
            Ok(engine) => {
                self.event_loop_proxy
                    .send_event(StateInitializationEvent(engine))
                    .unwrap_or_else(|_| panic!("Failed to send initialization event"));
            }
            // Startup failures (shader compilation among them) are fatal.
            Err(error) => {
                log::error!("renderer initialization failed: {error}");
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: StateInitializationEvent) {
        log::info!("renderer initialized");

        let engine = event.0;
        engine.window.request_redraw();
        self.application_state = State::Initialized(engine);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let State::Initialized(ref mut engine) = self.application_state else {
            return;
        };

        let egui_event_response = engine
            .renderer
            .egui
            .state
            .on_window_event(&engine.window, &event);
        if egui_event_response.repaint {
            engine.window.request_redraw();
        }
        if egui_event_response.consumed {
            return;
        }

        match event {
            WindowEvent::Resized(new_size) => engine.resize(new_size),

            WindowEvent::RedrawRequested => {
                match engine.render() {
                    Ok(()) => {}
                    Err(error) if error.is_fatal() => {
                        log::error!("{error}; shutting down");
                        engine.renderer.shutdown();
                        event_loop.exit();
                        return;
                    }
                    Err(error) => log::warn!("frame skipped: {error}"),
                }
                // Progressive accumulation wants a continuous redraw loop.
                engine.window.request_redraw();
            }

            WindowEvent::CloseRequested => {
                engine.renderer.shutdown();
                event_loop.exit();
            }

            _ => {}
        };
    }
}
