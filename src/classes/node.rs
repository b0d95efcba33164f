use super::Object;
use classbind_core::{BindResult, Bound, EngineClass, ObjectHandle, engine_class};
use tracing::trace;

engine_class! {
    /// A scene tree node. Nodes are manually managed: destroying a node
    /// destroys its children with it.
    pub struct Node: "Node" => Object;
}

pub mod raw {
    use super::Node;
    use classbind_core::{BindResult, EngineClass, EngineString, Frame};
    use classbind_sys::{ObjectPtr, StringRaw};

    pub fn get_name(this: &Node) -> BindResult<EngineString> {
        let handle = this.handle();
        let rt = handle.runtime();
        let mut frame = Frame::new();
        let ret = frame.ret::<StringRaw>()?;
        rt.bind("Node", "get_name")?.ptrcall(handle.checked()?, &mut frame)?;
        Ok(unsafe { EngineString::from_raw(rt.api(), frame.get(ret)?) })
    }

    pub fn set_name(this: &Node, name: &EngineString) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(name.as_raw())?;
        handle
            .runtime()
            .bind("Node", "set_name")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    /// The engine takes ownership of `child`.
    pub fn add_child(this: &Node, child: ObjectPtr) -> BindResult<()> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(child)?;
        handle
            .runtime()
            .bind("Node", "add_child")?
            .ptrcall(handle.checked()?, &mut frame)
    }

    pub fn get_child_count(this: &Node) -> BindResult<i64> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<i64>()?;
        handle
            .runtime()
            .bind("Node", "get_child_count")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_child(this: &Node, index: i64) -> BindResult<ObjectPtr> {
        let handle = this.handle();
        let mut frame = Frame::new();
        frame.arg(index)?;
        let ret = frame.ret::<ObjectPtr>()?;
        handle
            .runtime()
            .bind("Node", "get_child")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }

    pub fn get_parent(this: &Node) -> BindResult<ObjectPtr> {
        let handle = this.handle();
        let mut frame = Frame::new();
        let ret = frame.ret::<ObjectPtr>()?;
        handle
            .runtime()
            .bind("Node", "get_parent")?
            .ptrcall(handle.checked()?, &mut frame)?;
        Ok(frame.get(ret)?)
    }
}

impl Node {
    pub fn name(&self) -> BindResult<String> {
        raw::get_name(self)?.to_rust_string()
    }

    pub fn set_name(&self, name: &str) -> BindResult<()> {
        let name = classbind_core::EngineString::new(self.handle().runtime().api(), name);
        raw::set_name(self, &name)
    }

    /// Moves `child` into the tree under this node.
    ///
    /// The engine owns the child from here on; reach it again through
    /// [`get_child`](Self::get_child).
    pub fn add_child(&self, child: Node) -> BindResult<()> {
        raw::add_child(self, child.as_ptr())?;
        let raw = child.into_handle().end();
        trace!(child = ?raw, "child handed to the scene tree");
        Ok(())
    }

    pub fn child_count(&self) -> BindResult<usize> {
        Ok(raw::get_child_count(self)?.max(0) as usize)
    }

    /// The child at `index`, valid only while this node is borrowed.
    pub fn get_child(&self, index: usize) -> BindResult<Option<Bound<'_, Node>>> {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        let ptr = raw::get_child(self, index)?;
        let rt = self.handle().runtime();
        let bind = rt.bind("Node", "get_child")?;
        let child = ObjectHandle::acquire(rt, bind, ptr, Some(self.handle()))?;
        Ok(child.map(|handle| Bound::new(unsafe { Node::from_handle(handle) }, self)))
    }

    /// The parent node, if any. The engine keeps ownership of it.
    pub fn get_parent(&self) -> BindResult<Option<Node>> {
        let ptr = raw::get_parent(self)?;
        let rt = self.handle().runtime();
        let bind = rt.bind("Node", "get_parent")?;
        let parent = ObjectHandle::acquire(rt, bind, ptr, Some(self.handle()))?;
        Ok(parent.map(|handle| unsafe { Node::from_handle(handle) }))
    }

    pub fn children(&self) -> BindResult<Vec<Bound<'_, Node>>> {
        let mut children = Vec::new();
        for index in 0..self.child_count()? {
            if let Some(child) = self.get_child(index)? {
                children.push(child);
            }
        }
        Ok(children)
    }
}
