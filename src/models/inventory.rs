use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Semantic category of an inventory folder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FolderType {
    None,
    Texture,
    Sound,
    CallingCard,
    Landmark,
    Clothing,
    Object,
    Notecard,
    Root,
    LslText,
    BodyPart,
    Trash,
    Snapshot,
    LostAndFound,
    Animation,
    Gesture,
    Favorites,
    CurrentOutfit,
    Outfit,
    MyOutfits,
    Mesh,
    Inbox,
    Outbox,
    BasicRoot,
    MarketplaceListings,
    MarketplaceStock,
    Settings,
    Material,
    Suitcase,
}

impl FolderType {
    /// Numeric type code sent to clients as `type_default`
    pub fn code(self) -> i8 {
        match self {
            FolderType::None => -1,
            FolderType::Texture => 0,
            FolderType::Sound => 1,
            FolderType::CallingCard => 2,
            FolderType::Landmark => 3,
            FolderType::Clothing => 5,
            FolderType::Object => 6,
            FolderType::Notecard => 7,
            FolderType::Root => 8,
            FolderType::LslText => 10,
            FolderType::BodyPart => 13,
            FolderType::Trash => 14,
            FolderType::Snapshot => 15,
            FolderType::LostAndFound => 16,
            FolderType::Animation => 20,
            FolderType::Gesture => 21,
            FolderType::Favorites => 23,
            FolderType::CurrentOutfit => 46,
            FolderType::Outfit => 47,
            FolderType::MyOutfits => 48,
            FolderType::Mesh => 49,
            FolderType::Inbox => 50,
            FolderType::Outbox => 51,
            FolderType::BasicRoot => 52,
            FolderType::MarketplaceListings => 53,
            FolderType::MarketplaceStock => 54,
            FolderType::Settings => 56,
            FolderType::Material => 57,
            FolderType::Suitcase => 100,
        }
    }
}

/// Folders every tree is bootstrapped with, in creation order
pub const SYSTEM_FOLDERS: &[(FolderType, &str)] = &[
    (FolderType::Texture, "Textures"),
    (FolderType::Sound, "Sounds"),
    (FolderType::CallingCard, "Calling Cards"),
    (FolderType::Landmark, "Landmarks"),
    (FolderType::Clothing, "Clothing"),
    (FolderType::Object, "Objects"),
    (FolderType::Notecard, "Notecards"),
    (FolderType::LslText, "Scripts"),
    (FolderType::BodyPart, "Body Parts"),
    (FolderType::Trash, "Trash"),
    (FolderType::Snapshot, "Photo Album"),
    (FolderType::LostAndFound, "Lost And Found"),
    (FolderType::Animation, "Animations"),
    (FolderType::Gesture, "Gestures"),
    (FolderType::CurrentOutfit, "Current Outfit"),
    (FolderType::Outfit, "Outfit"),
    (FolderType::MyOutfits, "My Outfits"),
    (FolderType::Mesh, "Mesh"),
    (FolderType::Outbox, "Outbox"),
    (FolderType::MarketplaceListings, "Marketplace Listings"),
    (FolderType::MarketplaceStock, "Marketplace Stock"),
    (FolderType::Settings, "Settings"),
    (FolderType::Material, "Materials"),
    (FolderType::Suitcase, "Suitcase"),
];

/// One row of the folder table. The parent is referenced by id only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub folder_id: Uuid,
    pub name: String,
    pub folder_type: FolderType,
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub revision: i32,
}

/// Wire form of a folder as listed in inventory skeleton sections
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub folder_id: Uuid,
    pub name: String,
    pub type_default: i8,
    pub version: i32,
    pub parent_id: Uuid,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TreeError {
    #[error("tree has no root folder")]
    MissingRoot,

    #[error("tree has more than one root folder")]
    MultipleRoots,

    #[error("root folder {0} is not of root type")]
    UntypedRoot(Uuid),

    #[error("folder {0} has root type but a parent")]
    NestedRoot(Uuid),

    #[error("folder {0} appears more than once")]
    DuplicateFolder(Uuid),

    #[error("folder {folder} references unknown parent {parent}")]
    UnknownParent { folder: Uuid, parent: Uuid },

    #[error("folder {folder} is not owned by {owner}")]
    ForeignOwner { folder: Uuid, owner: Uuid },

    #[error("folder {0} is not reachable from the root")]
    Unreachable(Uuid),
}

/// Persisted shape of a tree: the flat folder table
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub owner_id: Uuid,
    pub folders: Vec<FolderRecord>,
}

/// Arena-backed folder tree for one owner.
///
/// Folders live in a flat table; `children` is a secondary index rebuilt
/// from the parent ids, so the tree holds no reference cycles.
#[derive(Clone, Debug)]
pub struct InventoryTree {
    owner_id: Uuid,
    root_id: Uuid,
    folders: Vec<FolderRecord>,
    index: HashMap<Uuid, usize>,
    children: HashMap<Uuid, Vec<Uuid>>,
}

impl InventoryTree {
    /// New tree holding only a root folder
    pub fn with_root(owner_id: Uuid, root_name: &str) -> Self {
        let root = FolderRecord {
            folder_id: Uuid::new_v4(),
            name: root_name.to_string(),
            folder_type: FolderType::Root,
            owner_id,
            parent_id: None,
            revision: 1,
        };
        let root_id = root.folder_id;

        let mut index = HashMap::new();
        index.insert(root_id, 0);

        Self {
            owner_id,
            root_id,
            folders: vec![root],
            index,
            children: HashMap::new(),
        }
    }

    /// New tree with a root and the full system folder set beneath it
    pub fn bootstrap(owner_id: Uuid, root_name: &str) -> Self {
        let mut tree = Self::with_root(owner_id, root_name);
        let root_id = tree.root_id;
        for (folder_type, name) in SYSTEM_FOLDERS {
            tree.push_child(root_id, *folder_type, name);
        }
        tree
    }

    /// Add a child folder under `parent_id`. Returns the new folder id.
    pub fn add_folder(
        &mut self,
        parent_id: Uuid,
        folder_type: FolderType,
        name: &str,
    ) -> Result<Uuid, TreeError> {
        if !self.index.contains_key(&parent_id) {
            return Err(TreeError::UnknownParent {
                folder: Uuid::nil(),
                parent: parent_id,
            });
        }
        if folder_type == FolderType::Root {
            return Err(TreeError::NestedRoot(Uuid::nil()));
        }

        Ok(self.push_child(parent_id, folder_type, name))
    }

    /// Append a folder under a parent already known to be in the tree
    fn push_child(&mut self, parent_id: Uuid, folder_type: FolderType, name: &str) -> Uuid {
        let record = FolderRecord {
            folder_id: Uuid::new_v4(),
            name: name.to_string(),
            folder_type,
            owner_id: self.owner_id,
            parent_id: Some(parent_id),
            revision: 1,
        };
        let folder_id = record.folder_id;

        self.index.insert(folder_id, self.folders.len());
        self.folders.push(record);
        self.children.entry(parent_id).or_default().push(folder_id);

        folder_id
    }

    /// Rebuild a tree from its persisted table, checking the tree invariants
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self, TreeError> {
        let TreeSnapshot { owner_id, folders } = snapshot;

        let mut index = HashMap::with_capacity(folders.len());
        let mut root_id = None;

        for (pos, folder) in folders.iter().enumerate() {
            if index.insert(folder.folder_id, pos).is_some() {
                return Err(TreeError::DuplicateFolder(folder.folder_id));
            }
            if folder.owner_id != owner_id {
                return Err(TreeError::ForeignOwner {
                    folder: folder.folder_id,
                    owner: owner_id,
                });
            }
            match (folder.parent_id, folder.folder_type) {
                (None, FolderType::Root) => {
                    if root_id.is_some() {
                        return Err(TreeError::MultipleRoots);
                    }
                    root_id = Some(folder.folder_id);
                }
                (None, _) => return Err(TreeError::UntypedRoot(folder.folder_id)),
                (Some(_), FolderType::Root) => {
                    return Err(TreeError::NestedRoot(folder.folder_id))
                }
                (Some(_), _) => {}
            }
        }

        let root_id = root_id.ok_or(TreeError::MissingRoot)?;

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for folder in &folders {
            if let Some(parent) = folder.parent_id {
                if !index.contains_key(&parent) {
                    return Err(TreeError::UnknownParent {
                        folder: folder.folder_id,
                        parent,
                    });
                }
                children.entry(parent).or_default().push(folder.folder_id);
            }
        }

        let tree = Self {
            owner_id,
            root_id,
            folders,
            index,
            children,
        };

        // A parent cycle detached from the root would leave folders unvisited
        let visited: HashSet<Uuid> = tree.walk().iter().map(|f| f.folder_id).collect();
        if let Some(orphan) = tree.folders.iter().find(|f| !visited.contains(&f.folder_id)) {
            return Err(TreeError::Unreachable(orphan.folder_id));
        }

        Ok(tree)
    }

    pub fn to_snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            owner_id: self.owner_id,
            folders: self.folders.clone(),
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    pub fn root(&self) -> &FolderRecord {
        &self.folders[self.index[&self.root_id]]
    }

    pub fn get(&self, folder_id: Uuid) -> Option<&FolderRecord> {
        self.index.get(&folder_id).map(|&pos| &self.folders[pos])
    }

    pub fn children_of(&self, folder_id: Uuid) -> &[Uuid] {
        self.children
            .get(&folder_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Folders in pre-order, root first, children in insertion order
    pub fn walk(&self) -> Vec<&FolderRecord> {
        let mut out = Vec::with_capacity(self.folders.len());
        let mut stack = vec![self.root_id];

        while let Some(id) = stack.pop() {
            if let Some(folder) = self.get(id) {
                out.push(folder);
                for child in self.children_of(id).iter().rev() {
                    stack.push(*child);
                }
            }
        }

        out
    }

    /// Flatten to wire descriptors. The root reports the nil id as its parent.
    pub fn serialize(&self) -> Vec<FolderDescriptor> {
        self.walk()
            .into_iter()
            .map(|folder| FolderDescriptor {
                folder_id: folder.folder_id,
                name: folder.name.clone(),
                type_default: folder.folder_type.code(),
                version: folder.revision,
                parent_id: folder.parent_id.unwrap_or_else(Uuid::nil),
            })
            .collect()
    }
}
