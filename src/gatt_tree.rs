use crate::characteristic::Characteristic;
use crate::descriptor::Descriptor;
use crate::service::Service;
use crate::CbUuid;

/// Services discovered on one connection, with attribute lookups by handle.
#[derive(Debug, Clone, Default)]
pub(crate) struct GattTree {
    services: Vec<Service>,
}

impl GattTree {
    /// Builds the tree, keeping only the services listed in `filter` (all if `None`).
    pub fn new(services: Vec<Service>, filter: Option<&[CbUuid]>) -> Self {
        let services = match filter {
            Some(uuids) if !uuids.is_empty() => services
                .into_iter()
                .filter(|serv| uuids.contains(&serv.uuid()))
                .collect(),
            _ => services,
        };
        Self { services }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn find_characteristic(&self, handle: u16) -> Option<Characteristic> {
        self.characteristics().find(|ch| ch.handle() == handle).cloned()
    }

    /// Finds a descriptor together with the characteristic containing it.
    pub fn find_descriptor(&self, handle: u16) -> Option<(Characteristic, Descriptor)> {
        self.characteristics().find_map(|ch| {
            ch.descriptor(handle)
                .map(|desc| (ch.clone(), desc.clone()))
        })
    }

    pub fn contains_service(&self, uuid: &CbUuid) -> bool {
        self.services.iter().any(|serv| &serv.uuid() == uuid)
    }

    /// Stops every notification stream of this tree.
    pub fn close_notifiers(&self) {
        for ch in self.characteristics() {
            ch.set_notifying(false);
            ch.notifier().close();
        }
    }

    fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.services
            .iter()
            .flat_map(|serv| serv.all_characteristics().iter())
    }
}
