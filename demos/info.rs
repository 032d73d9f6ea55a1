//! Print the display geometry of the first connected HMD and the stereo
//! parameters for a native-resolution window.

use riftcore::{RiftDriver, Session, Viewport};

fn main() {
    env_logger::init();

    let mut session = Session::new(RiftDriver::default());
    if !session.init() {
        if let Some(e) = session.last_error() {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }

    if let Some(d) = session.descriptor() {
        println!("Display:        {} ({})", d.display_name, d.manufacturer);
        println!("Resolution:     {}x{}", d.h_resolution, d.v_resolution);
        println!("Screen size:    {:.5} x {:.5} m", d.h_screen_size, d.v_screen_size);
        println!("Eye to screen:  {:.4} m", d.eye_to_screen_distance);
        println!("Lens sep:       {:.4} m", d.lens_separation_distance);
        println!("Distortion K:   {:?}", d.distortion_k);
    }

    let viewport = Viewport::new(0, 0, session.h_resolution(), session.v_resolution());
    match session.eye_render_params(viewport, 0.01, 1000.0, 1.0, (-1.0, 0.0)) {
        Ok(params) => {
            println!();
            println!("Render scale:   {:.4}", params.render_scale);
            println!("Center offset:  {:+.4}", params.x_center_offset);
            println!("Vertical FOV:   {:.2} deg", params.fov_y_degrees);
            println!("Eye aspect:     {:.4}", params.aspect);
            println!("Left viewport:  {:?}", params.left.viewport);
            println!("Right viewport: {:?}", params.right.viewport);
        }
        Err(e) => eprintln!("Stereo setup failed: {}", e),
    }
}
