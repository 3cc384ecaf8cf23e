use image::RgbImage;

/// Resize the image to `input_size` x `input_size` and lay it out as a
/// [1, 3, H, W] float tensor normalized to [0, 1], channel-planar.
pub fn chw_tensor_data(image: &RgbImage, input_size: u32) -> Vec<f32> {
    let resized = if image.width() == input_size && image.height() == input_size {
        image.clone()
    } else {
        image::imageops::resize(
            image,
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        )
    };

    let size = (input_size * input_size) as usize;
    let raw = resized.as_raw();
    let mut tensor_data = vec![0f32; 3 * size];

    for idx in 0..size {
        tensor_data[idx] = raw[idx * 3] as f32 / 255.0;
        tensor_data[size + idx] = raw[idx * 3 + 1] as f32 / 255.0;
        tensor_data[2 * size + idx] = raw[idx * 3 + 2] as f32 / 255.0;
    }

    tensor_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn planar_layout_and_normalization() {
        let mut img = RgbImage::new(2, 2);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([255, 0, 51]);
        }

        let data = chw_tensor_data(&img, 2);
        assert_eq!(data.len(), 3 * 2 * 2);
        // R plane all ones, G plane all zeros, B plane all 0.2.
        assert!(data[..4].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(data[4..8].iter().all(|&v| v == 0.0));
        assert!(data[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn resizes_to_requested_input_size() {
        let img = RgbImage::new(10, 7);
        let data = chw_tensor_data(&img, 4);
        assert_eq!(data.len(), 3 * 4 * 4);
    }
}
