use app::application::{Application, StateInitializationEvent};
use winit::event_loop::EventLoop;

fn main() {
    env_logger::init();

    let event_loop = EventLoop::<StateInitializationEvent>::with_user_event()
        .build()
        .unwrap();
    let mut application = Application::new(&event_loop);
    event_loop.run_app(&mut application).unwrap();
}
