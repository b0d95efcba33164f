use super::{Object, RefCounted};
use classbind_core::{
    BindResult, Color, EngineClass, EngineStatus, ObjectHandle, Rect2, Runtime, Vector2i, engine_class,
};
use num_enum::{FromPrimitive, IntoPrimitive};

engine_class! {
    /// Pixel data in CPU memory.
    pub struct Image: "Image" => RefCounted, inherits [Object];
}

/// Pixel formats understood by `Image` (uncompressed subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(i64)]
pub enum ImageFormat {
    L8 = 0,
    La8 = 1,
    R8 = 2,
    Rg8 = 3,
    Rgb8 = 4,
    Rgba8 = 5,
    Rgba4444 = 6,
    Rgb565 = 7,
    Rf = 8,
    Rgf = 9,
    Rgbf = 10,
    Rgbaf = 11,
    #[num_enum(catch_all)]
    Other(i64),
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            ImageFormat::L8 | ImageFormat::R8 => Some(1),
            ImageFormat::La8 | ImageFormat::Rg8 | ImageFormat::Rgba4444 | ImageFormat::Rgb565 => {
                Some(2)
            }
            ImageFormat::Rgb8 => Some(3),
            ImageFormat::Rgba8 | ImageFormat::Rf => Some(4),
            ImageFormat::Rgf => Some(8),
            ImageFormat::Rgbf => Some(12),
            ImageFormat::Rgbaf => Some(16),
            ImageFormat::Other(_) => None,
        }
    }
}

pub mod raw {
    use super::Image;
    use classbind_core::{BindResult, Color, EngineClass, EngineString, Frame, Rect2, Runtime, Vector2i};
    use classbind_sys::ObjectPtr;
    use std::ptr;

    /// Static factory; the caller owns the returned image.
    pub fn create(
        rt: &Runtime,
        width: i64,
        height: i64,
        use_mipmaps: bool,
        format: i64,
    ) -> BindResult<ObjectPtr> {
        let mut frame = Frame::new();
        frame.arg(width)?;
        frame.arg(height)?;
        frame.arg(use_mipmaps)?;
        frame.arg(format)?;
        let ret = frame.ret::<ObjectPtr>()?;
        rt.bind("Image", "create")?.ptrcall(ptr::null_mut(), &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_width(this: &Image) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("Image", "get_width")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_height(this: &Image) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("Image", "get_height")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_size(this: &Image) -> BindResult<Vector2i> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<Vector2i>()?;
        handle
            .runtime()
            .bind("Image", "get_size")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_format(this: &Image) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("Image", "get_format")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn fill(this: &Image, color: Color) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(color)?;
        handle
            .runtime()
            .bind("Image", "fill")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn fill_rect(this: &Image, rect: Rect2, color: Color) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(rect)?;
        frame.arg(color)?;
        handle
            .runtime()
            .bind("Image", "fill_rect")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn get_pixel(this: &Image, x: i64, y: i64) -> BindResult<Color> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(x)?;
        frame.arg(y)?;
        let ret = frame.ret::<Color>()?;
        handle
            .runtime()
            .bind("Image", "get_pixel")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn set_pixel(this: &Image, x: i64, y: i64, color: Color) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(x)?;
        frame.arg(y)?;
        frame.arg(color)?;
        handle
            .runtime()
            .bind("Image", "set_pixel")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    /// Returns the engine status code.
    pub fn save_png(this: &Image, path: &EngineString) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(path.as_raw())?;
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("Image", "save_png")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }
}

impl Image {
    /// Creates a blank image; `None` if the engine rejects the dimensions.
    pub fn create(
        rt: &'static Runtime,
        width: u32,
        height: u32,
        use_mipmaps: bool,
        format: ImageFormat,
    ) -> BindResult<Option<Image>> {
        let ptr = raw::create(rt, i64::from(width), i64::from(height), use_mipmaps, format.into())?;
        let bind = rt.bind("Image", "create")?;
        let handle = ObjectHandle::acquire(rt, bind, ptr, None)?;
        Ok(handle.map(|handle| unsafe { Image::from_handle(handle) }))
    }

    pub fn width(&self) -> BindResult<u32> {
        Ok(raw::get_width(self)?.clamp(0, u32::MAX as i64) as u32)
    }

    pub fn height(&self) -> BindResult<u32> {
        Ok(raw::get_height(self)?.clamp(0, u32::MAX as i64) as u32)
    }

    pub fn size(&self) -> BindResult<Vector2i> {
        raw::get_size(self)
    }

    pub fn format(&self) -> BindResult<ImageFormat> {
        Ok(ImageFormat::from(raw::get_format(self)?))
    }

    pub fn fill(&self, color: Color) -> BindResult<()> {
        raw::fill(self, color)
    }

    pub fn fill_rect(&self, rect: Rect2, color: Color) -> BindResult<()> {
        raw::fill_rect(self, rect, color)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> BindResult<Color> {
        raw::get_pixel(self, i64::from(x), i64::from(y))
    }

    pub fn set_pixel(&self, x: u32, y: u32, color: Color) -> BindResult<()> {
        raw::set_pixel(self, i64::from(x), i64::from(y), color)
    }

    /// Writes the image as PNG. Failures come back as the engine's status.
    pub fn save_png(&self, path: &str) -> BindResult<EngineStatus> {
        let path = classbind_core::EngineString::new(self.handle().runtime().api(), path);
        Ok(EngineStatus::from(raw::save_png(self, &path)?))
    }
}
