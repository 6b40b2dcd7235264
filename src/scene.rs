use log::debug;

/// A game state such as a menu or a level.
///
/// Only one scene is active at a time. Switching pauses the previous scene
/// and resumes the next one.
pub trait Scene {
    fn name(&self) -> &str;

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn cleanup(&mut self) {}

    fn resize(&mut self, _width: u32, _height: u32) {}
}

#[derive(Default)]
pub struct Scenes {
    scenes: Vec<Box<dyn Scene>>,
    active: Option<String>,
}

impl Scenes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scene. Returns false if one with the same name exists.
    pub fn add(&mut self, scene: Box<dyn Scene>) -> bool {
        if self.get(scene.name()).is_some() {
            return false;
        }
        debug!("added scene {}", scene.name());
        self.scenes.push(scene);
        true
    }

    /// Removes the named scene after calling its cleanup.
    ///
    /// Removing the active scene leaves no scene active.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.scenes.iter().position(|scene| scene.name() == name) else {
            return false;
        };
        let mut scene = self.scenes.remove(index);
        scene.cleanup();
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        true
    }

    pub fn remove_all(&mut self) {
        for scene in self.scenes.iter_mut() {
            scene.cleanup();
        }
        self.scenes.clear();
        self.active = None;
    }

    pub fn get(&self, name: &str) -> Option<&dyn Scene> {
        self.scenes
            .iter()
            .find(|scene| scene.name() == name)
            .map(|scene| scene.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Scene + 'static)> {
        self.scenes
            .iter_mut()
            .find(|scene| scene.name() == name)
            .map(|scene| scene.as_mut())
    }

    /// Pauses the active scene and activates the named one.
    ///
    /// Returns false and changes nothing if no such scene is registered.
    pub fn switch(&mut self, name: &str) -> bool {
        if self.get(name).is_none() {
            return false;
        }
        if let Some(active) = self.active.take() {
            if let Some(scene) = self.get_mut(&active) {
                scene.pause();
            }
        }
        self.active = Some(name.to_string());
        if let Some(scene) = self.get_mut(name) {
            scene.resume();
        }
        debug!("switched to scene {name}");
        true
    }

    pub fn active(&self) -> Option<&dyn Scene> {
        self.active.as_deref().and_then(|name| self.get(name))
    }

    pub fn active_mut(&mut self) -> Option<&mut (dyn Scene + 'static)> {
        let name = self.active.clone()?;
        self.get_mut(&name)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Scene for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn pause(&mut self) {
            self.log.borrow_mut().push(format!("pause {}", self.name));
        }

        fn resume(&mut self) {
            self.log.borrow_mut().push(format!("resume {}", self.name));
        }

        fn cleanup(&mut self) {
            self.log.borrow_mut().push(format!("cleanup {}", self.name));
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.log
                .borrow_mut()
                .push(format!("resize {} {width}x{height}", self.name));
        }
    }

    fn scenes(log: &Log) -> Scenes {
        let mut scenes = Scenes::new();
        scenes.add(Box::new(Recorder {
            name: "menu",
            log: log.clone(),
        }));
        scenes.add(Box::new(Recorder {
            name: "level",
            log: log.clone(),
        }));
        scenes
    }

    #[test]
    fn switching_pauses_previous_and_resumes_next() {
        let log = Log::default();
        let mut scenes = scenes(&log);
        assert!(scenes.switch("menu"));
        assert!(scenes.switch("level"));
        assert!(!scenes.switch("credits"));
        assert_eq!(scenes.active().map(|s| s.name()), Some("level"));
        if let Some(scene) = scenes.active_mut() {
            scene.resize(640, 480);
        }
        assert_eq!(
            *log.borrow(),
            vec![
                "resume menu",
                "pause menu",
                "resume level",
                "resize level 640x480"
            ]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let log = Log::default();
        let mut scenes = scenes(&log);
        assert!(!scenes.add(Box::new(Recorder {
            name: "menu",
            log: log.clone(),
        })));
        assert_eq!(scenes.len(), 2);
    }

    #[test]
    fn removing_the_active_scene_clears_it() {
        let log = Log::default();
        let mut scenes = scenes(&log);
        scenes.switch("level");
        assert!(scenes.remove("level"));
        assert!(scenes.active().is_none());
        scenes.remove_all();
        assert!(scenes.is_empty());
        assert_eq!(log.borrow().last().map(String::as_str), Some("cleanup menu"));
    }
}
