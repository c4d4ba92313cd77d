//! Built-in scanner catalog, in wizard step order.
//!
//! Scanners that read a cell always come after the scanner that writes it;
//! [`RegistryBuilder::register`] rejects the catalog otherwise.

use bytes::Bytes;

use super::{RegistryBuilder, ScannerDef};
use crate::codec::contains;
use crate::error::Result;
use crate::protocol::{Origin, IPC_DATA};
use crate::state::CellKey;

/// Operator's maximum HP, written by `UpdateHpMpTp`
pub const MAX_HP: CellKey<u32> = CellKey::calibration("max_hp");
/// Search comment text, written by `SetSearchInfoHandler`
pub const SEARCH_COMMENT: CellKey<Bytes> = CellKey::calibration("search_comment");
/// Retainer name, written by `RetainerInformation`
pub const RETAINER_NAME: CellKey<Bytes> = CellKey::calibration("retainer_name");
/// Lightning crystal count, written by `ActorCast`
pub const LIGHTNING_CRYSTALS: CellKey<u32> = CellKey::calibration("lightning_crystals");
/// Inventory transaction id, written by `InventoryModifyHandler` and `InventoryTransaction`
pub const INVENTORY_TX: CellKey<u32> = CellKey::correlation("inventory_tx");

/// Grade 7 Dark Matter
const MARKET_BOARD_ITEM: u32 = 17837;
/// Pill Bug
const BAIT_ITEM: u32 = 2587;
/// Fishing event handler
const FISHING_EVENT: u32 = 0x150001;
const FULL_MP: u32 = 10000;
/// Chocobo saddlebag container
const SADDLEBAG_CONTAINER: u16 = 4000;
const DIA_STATUS: u16 = 1871;
const HOLY_ACTION: u16 = 139;
const GLARE_ACTION: u16 = 16533;

/// Dequantize a u16 map coordinate into world units
fn unpack_coord(raw: u16) -> f32 {
    raw as f32 / 65536.0 * 2000.0 - 1000.0
}

fn near(value: f32, target: f32, tolerance: f32) -> bool {
    (value - target).abs() < tolerance
}

pub fn declare_scanners(registry: &mut RegistryBuilder) -> Result<()> {
    //=================
    registry.register(
        ScannerDef::new("PlayerSetup", "Please log in.", Origin::Server)
            .prompt("Please enter your character name:")
            .scan_with(|packet, [name], _| {
                Ok(packet.size() > 300 && contains(&packet.data, name.as_bytes()))
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "UpdateHpMpTp",
            "Please alter your HP or MP and allow your stats to regenerate completely.",
            Origin::Server,
        )
        .prompt("Please enter your max HP:")
        .writes(MAX_HP)
        .scan_with(|packet, [max_hp], ctx| {
            let max_hp = ctx.calibrate_parsed(MAX_HP, 0, max_hp)?;
            if packet.size() != 40 && packet.size() != 48 {
                return Ok(false);
            }
            Ok(packet.ipc_u32(0)? == max_hp && packet.ipc_u16(4)? as u32 == FULL_MP)
        }),
    )?;
    registry.register(
        ScannerDef::new("PlayerStats", "Switch to another job, and then switch back.", Origin::Server)
            .reads(MAX_HP)
            .scan(|packet, ctx| {
                Ok(packet.size() == 256
                    && packet.ipc_u32(24)? == ctx.get(MAX_HP)?
                    && packet.ipc_u32(28)? == FULL_MP
                    && packet.ipc_u32(36)? == FULL_MP)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("UpdatePositionHandler", "Please move your character.", Origin::Client)
            .scan(|packet, _| {
                Ok(packet.size() == 56
                    && packet.is_self_directed()
                    && packet.ipc_u32(4)? == 0
                    && packet.ipc_u64(8)? != 0
                    && packet.view().trailing_u32()? == 0)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("ClientTrigger", "Please draw your weapon.", Origin::Client)
            .scan(|packet, _| Ok(packet.size() == 64 && packet.ipc_u32(0)? == 1)),
    )?;
    registry.register(
        ScannerDef::new("ActorControl", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 56 && packet.ipc_u32(4)? == 1)),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "ActorControlSelf",
            "Please enter sanctuary and wait for rested bonus gains.",
            Origin::Server,
        )
        .scan(|packet, _| {
            if packet.size() != 64 || packet.ipc_u16(0)? != 24 || packet.ipc_u32(4)? > 604800 {
                return Ok(false);
            }
            for offset in (8..=24).step_by(4) {
                if packet.ipc_u32(offset)? != 0 {
                    return Ok(false);
                }
            }
            Ok(true)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "ActorControlTarget",
            "Please mark yourself with the \"1\" marker.",
            Origin::Server,
        )
        .scan(|packet, _| {
            Ok(packet.size() == 64
                && packet.ipc_u32(0x04)? == 0
                && packet.is_self_directed()
                && packet.source_actor == packet.ipc_u32(0x08)?
                && packet.source_actor == packet.ipc_u32(0x18)?)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("ChatHandler", "Please /say your message in-game:", Origin::Client)
            .prompt("Please enter a message to /say in-game:")
            .scan_with(|packet, [message], _| Ok(contains(&packet.data, message.as_bytes()))),
    )?;
    //=================
    registry.register(
        ScannerDef::new("Playtime", "Please type /playtime.", Origin::Server)
            .prompt("Type /playtime, and input the days you played:")
            .scan_with(|packet, [days], ctx| {
                let input_days: u32 = ctx.parse_param(0, days)?;
                if packet.size() != 40 || !packet.is_self_directed() {
                    return Ok(false);
                }
                let packet_days = packet.ipc_u32(0)? / 60 / 24;
                // 23:59 played still reads as the previous day in-game
                Ok(input_days == packet_days || input_days.checked_add(1) == Some(packet_days))
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("SetSearchInfoHandler", "Please set that search comment in-game.", Origin::Client)
            .prompt("Please enter a somewhat lengthy search message here, before entering it in-game:")
            .writes(SEARCH_COMMENT)
            .scan_with(|packet, [comment], ctx| {
                let comment = ctx.calibrate_text(SEARCH_COMMENT, comment)?;
                Ok(contains(&packet.data, &comment))
            }),
    )?;
    registry.register(
        ScannerDef::new("UpdateSearchInfo", "", Origin::Server)
            .reads(SEARCH_COMMENT)
            .scan(|packet, ctx| Ok(contains(&packet.data, &ctx.get(SEARCH_COMMENT)?))),
    )?;
    registry.register(
        ScannerDef::new(
            "ExamineSearchInfo",
            "Open your search information with the \"View Search Info\" button.",
            Origin::Server,
        )
        .reads(SEARCH_COMMENT)
        .scan(|packet, ctx| {
            Ok(packet.size() > 232 && contains(&packet.data, &ctx.get(SEARCH_COMMENT)?))
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("Examine", "Please examine that character's equipment.", Origin::Server)
            .prompt("Please enter a nearby character's name:")
            .scan_with(|packet, [name], _| {
                Ok(packet.size() == 1016 && contains(&packet.data, name.as_bytes()))
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "MarketBoardSearchResult",
            "Please click \"Catalysts\" on the market board.",
            Origin::Server,
        )
        .scan(|packet, _| {
            if packet.size() != 208 {
                return Ok(false);
            }
            for i in 0..22 {
                let item_id = packet.ipc_u32(8 * i)?;
                if item_id == 0 {
                    break;
                }
                if item_id == MARKET_BOARD_ITEM {
                    return Ok(true);
                }
            }
            Ok(false)
        }),
    )?;
    registry.register(
        ScannerDef::new(
            "MarketBoardItemListingCount",
            "Please open the market board listings for Grade 7 Dark Matter.",
            Origin::Server,
        )
        .scan(|packet, _| Ok(packet.size() == 48 && packet.ipc_u32(0)? == MARKET_BOARD_ITEM)),
    )?;
    registry.register(
        ScannerDef::new("MarketBoardItemListingHistory", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 1080 && packet.ipc_u32(0)? == MARKET_BOARD_ITEM)),
    )?;
    registry.register(
        ScannerDef::new("MarketBoardItemListing", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() > 1552 && packet.ipc_u32(44)? == MARKET_BOARD_ITEM)),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "ActorMove",
            "Please teleport to Limsa Lominsa Lower Decks and wait.",
            Origin::Server,
        )
        .scan(|packet, _| {
            if packet.size() != 48 {
                return Ok(false);
            }
            let x = unpack_coord(packet.ipc_u16(6)?);
            let y = unpack_coord(packet.ipc_u16(8)?);
            let z = unpack_coord(packet.ipc_u16(12)?);
            Ok(near(x, -85.0, 15.0) && near(z, 0.0, 15.0) && near(y, 19.0, 2.0))
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "MarketTaxRates",
            "Please visit a retainer counter and request information about market tax rates.",
            Origin::Server,
        )
        .scan(|packet, _| {
            if packet.size() != 72 {
                return Ok(false);
            }
            for offset in [8, 12, 16, 20] {
                if packet.ipc_u32(offset)? > 7 {
                    return Ok(false);
                }
            }
            Ok(true)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("RetainerInformation", "Please use the Summoning Bell.", Origin::Server)
            .prompt("Please enter one of your retainers' names:")
            .writes(RETAINER_NAME)
            .scan_with(|packet, [name], ctx| {
                let name = ctx.calibrate_text(RETAINER_NAME, name)?;
                Ok(packet.size() == 112 && contains(packet.view().window(73, 32), &name))
            }),
    )?;
    registry.register(
        ScannerDef::new("NpcSpawn", "Please summon that retainer.", Origin::Server)
            .reads(RETAINER_NAME)
            .scan(|packet, ctx| {
                Ok(packet.size() > 624
                    && contains(packet.view().window(588, 36), &ctx.get(RETAINER_NAME)?))
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "PlayerSpawn",
            "Please wait for another player to spawn in your vicinity.",
            Origin::Server,
        )
        .prompt("Please enter your world ID:")
        .scan_with(|packet, [world], ctx| {
            let world: u16 = ctx.parse_param(0, world)?;
            Ok(packet.size() > 500 && packet.ipc_u16(4)? == world)
        }),
    )?;
    registry.register(
        ScannerDef::new("ActorFreeSpawn", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 40 && packet.is_self_directed())),
    )?;
    //=================
    registry.register(
        ScannerDef::new("ItemInfo", "Please teleport and open your chocobo saddlebag.", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 96 && packet.ipc_u16(8)? == SADDLEBAG_CONTAINER)),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "UpdateClassInfo",
            "Please switch to the job you entered a level for:",
            Origin::Server,
        )
        .prompt("Please enter the level of the job you can switch to:")
        .scan_with(|packet, [level], ctx| {
            let level: u16 = ctx.parse_param(0, level)?;
            Ok(packet.size() == 48 && packet.ipc_u16(4)? == level)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("ActorCast", "Please teleport to New Gridania.", Origin::Server)
            .prompt("Please enter the number of Lightning Crystals you have:")
            .writes(LIGHTNING_CRYSTALS)
            .scan_with(|packet, [crystals], ctx| {
                ctx.calibrate_parsed(LIGHTNING_CRYSTALS, 0, crystals)?;
                Ok(packet.size() == 64 && packet.ipc_u16(0)? == 5)
            }),
    )?;
    registry.register(
        ScannerDef::new("CurrencyCrystalInfo", "", Origin::Server)
            .reads(LIGHTNING_CRYSTALS)
            .scan(|packet, ctx| {
                Ok(packet.size() == 64
                    && packet.ipc_u16(4)? == 2001
                    && packet.ipc_u16(6)? == 10
                    && packet.ipc_u32(8)? == ctx.get(LIGHTNING_CRYSTALS)?
                    && packet.ipc_u32(16)? == 12)
            }),
    )?;
    registry.register(
        ScannerDef::new("InitZone", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 128 && packet.ipc_u16(2)? == 132)),
    )?;
    //=================
    registry.register(
        ScannerDef::new("EffectResult", "Please use Sprint while at full HP and MP.", Origin::Server)
            .scan(|packet, _| {
                Ok(packet.size() == 120
                    && packet.is_self_directed()
                    && packet.ipc_u32(4)? == packet.source_actor
                    && packet.ipc_u32(8)? == packet.ipc_u32(12)?
                    && packet.ipc_u16(16)? as u32 == FULL_MP
                    && packet.ipc_u8(21)? > 0)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "EventStart",
            "Please begin fishing and put your rod away immediately.",
            Origin::Server,
        )
        .scan(|packet, _| Ok(packet.size() == 56 && packet.ipc_u32(8)? == FISHING_EVENT)),
    )?;
    registry.register(
        ScannerDef::new("EventPlay", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 72 && packet.ipc_u32(8)? == FISHING_EVENT)),
    )?;
    registry.register(
        ScannerDef::new("EventFinish", "", Origin::Server).scan(|packet, _| {
            Ok(packet.size() == 48
                && packet.ipc_u32(0)? == FISHING_EVENT
                && packet.ipc_u8(4)? == 0x14
                && packet.ipc_u8(5)? == 0x01)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("SomeDirectorUnk4", "Please cast your line and catch a fish.", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 56 && packet.ipc_u32(0x08)? == 257)),
    )?;
    registry.register(
        ScannerDef::new("EventPlay4", "", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 80 && packet.ipc_u32(0x1C)? == 284)),
    )?;
    //=================
    registry.register(
        ScannerDef::new("UpdateInventorySlot", "Please purchase a Pill Bug to use as bait.", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 96 && packet.ipc_u32(0x10)? == BAIT_ITEM)),
    )?;
    //=================
    registry.register(
        ScannerDef::new("InventoryModifyHandler", "Please drop the Pill Bug.", Origin::Client)
            .writes(INVENTORY_TX)
            .scan(|packet, ctx| {
                if packet.size() != 80 || packet.ipc_u16(0x18)? as u32 != BAIT_ITEM {
                    return Ok(false);
                }
                ctx.record(INVENTORY_TX, packet.ipc_u32(0)?)?;
                let base_offset = packet.ipc_u16(4)?;
                ctx.annotate(format!("Base offset: 0x{base_offset:X}"));
                Ok(true)
            }),
    )?;
    registry.register(
        ScannerDef::new("InventoryActionAck", "Please wait.", Origin::Server)
            .reads(INVENTORY_TX)
            .scan(|packet, ctx| {
                Ok(packet.size() == 48 && packet.ipc_u32(0)? == ctx.get(INVENTORY_TX)?)
            }),
    )?;
    registry.register(
        ScannerDef::new("InventoryTransaction", "Please wait.", Origin::Server)
            .writes(INVENTORY_TX)
            .scan(|packet, ctx| {
                if packet.size() != 80 || packet.ipc_u16(0x18)? as u32 != BAIT_ITEM {
                    return Ok(false);
                }
                ctx.record(INVENTORY_TX, packet.ipc_u32(0)?)?;
                Ok(true)
            }),
    )?;
    registry.register(
        ScannerDef::new("InventoryTransactionFinish", "Please wait.", Origin::Server)
            .reads(INVENTORY_TX)
            .scan(|packet, ctx| {
                Ok(packet.size() == 48 && packet.ipc_u32(0)? == ctx.get(INVENTORY_TX)?)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("CFPreferredRole", "Please wait, this may take some time...", Origin::Server)
            .scan(|packet, _| {
                if packet.size() != 48 {
                    return Ok(false);
                }
                for i in 1..10 {
                    if !(1..=4).contains(&packet.ipc_u8(i)?) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "CFNotify",
            "Please enter the \"The Vault\" as an undersized party.",
            Origin::Server,
        )
        .scan(|packet, _| Ok(packet.size() == 64 && packet.ipc_u8(20)? == 0x22)),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "UpdatePositionInstance",
            "Please move your character in an/the instance.",
            Origin::Client,
        )
        .scan(|packet, _| {
            if packet.size() != 72 || !packet.is_self_directed() {
                return Ok(false);
            }
            for offset in [0x00, 0x08, 0x10, 0x18] {
                if packet.ipc_u64(offset)? == 0 {
                    return Ok(false);
                }
            }
            Ok(packet.view().trailing_u32()? == 0)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "PrepareZoning",
            "Please find an Aethernet Shard and teleport to Lancers' Guild.",
            Origin::Server,
        )
        .scan(|packet, _| {
            if packet.size() != 48 {
                return Ok(false);
            }
            let log_message = packet.ipc_u32(0)?;
            let target_zone = packet.ipc_u16(4)?;
            let animation = packet.ipc_u16(6)?;
            let fade_out_time = packet.ipc_u8(10)?;
            Ok(log_message == 0
                && target_zone == 133
                && animation == 112
                && fade_out_time == 14
                && packet.is_self_directed())
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "ActorSetPos",
            "Please teleport to Mih Khetto's Amphitheatre via the Aethernet Shard.",
            Origin::Server,
        )
        .scan(|packet, _| {
            if packet.size() != 56 {
                return Ok(false);
            }
            let x = packet.ipc_f32(8)?;
            let y = packet.ipc_f32(12)?;
            let z = packet.ipc_f32(16)?;
            Ok(near(x, -75.0, 15.0) && near(z, -140.0, 15.0) && near(y, 7.0, 2.0))
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "PlaceFieldMarker",
            "Please target the Mih Khetto's Amphitheatre Aethernet Shard and type /waymark A <t>",
            Origin::Server,
        )
        .scan(|packet, _| {
            Ok(packet.size() == 48
                && packet.is_self_directed()
                && packet.ipc_u16(0)? == 256
                && packet.ipc_u32(0x08)? == 7237)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("PlaceFieldMarkerPreset", "Please type /waymark clear", Origin::Server)
            .scan(|packet, _| {
                if packet.size() != 136 || !packet.is_self_directed() {
                    return Ok(false);
                }
                for i in 0..24 {
                    if packet.ipc_u32(0x04 + 4 * i)? != 0 {
                        return Ok(false);
                    }
                }
                Ok(true)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("ObjectSpawn", "Please enter a furnished house.", Origin::Server).scan(|packet, _| {
            Ok(packet.size() == 96
                && packet.ipc_u8(1)? == 12
                && packet.ipc_u8(2)? == 4
                && packet.ipc_u8(3)? == 0
                && packet.ipc_u32(12)? == 0)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("LoadFurniture", "Please enter a furnished house and exit.", Origin::Server)
            .scan(|packet, _| {
                Ok(packet.size() == 2448 && packet.ipc_u8(0)? == 0xFF && packet.ipc_u8(7)? == 0xFF)
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("MoveFurniture", "Please move a furniture to ground.", Origin::Client)
            .scan(|packet, _| {
                if packet.size() != 64 {
                    return Ok(false);
                }
                // ground floor sits at 0 or -7 depending on the house
                let y = packet.ipc_f32(16)?;
                Ok(near(y, 0.0, 0.01) || near(y, -7.0, 0.01))
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new("CheckResident", "Please check the resident list at crystal.", Origin::Server)
            .scan(|packet, _| {
                Ok(packet.size() == 2440 && matches!(packet.ipc_u8(4)?, 0x53 | 0x54 | 0x55 | 0x81))
            }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "CrossWorldChat",
            "Please wait for another player to say something in your world.",
            Origin::Server,
        )
        .prompt("Please enter another player's world ID:")
        .scan_with(|packet, [world], ctx| {
            let world: i16 = ctx.parse_param(0, world)?;
            Ok(packet.size() == 1104 && packet.ipc_i16(12)? == world)
        }),
    )?;
    //=================
    registry.register(
        ScannerDef::new(
            "Effect",
            "Switch to White Mage, and cast Glare on an enemy. Then wait for a damage tick.",
            Origin::Server,
        )
        .scan(|packet, _| Ok(packet.size() == 156 && packet.ipc_u16(8)? == GLARE_ACTION)),
    )?;
    //=================
    registry.register(
        ScannerDef::new("AddStatusEffect", "Please use Dia.", Origin::Server).scan(|packet, _| {
            // Grouping follows the heuristic as originally written (&& binds
            // tighter than ||); unconfirmed whether that was the intent.
            Ok(packet.size() == 128 && packet.ipc_u16(30)? == DIA_STATUS
                || packet.size() == 120 && packet.ipc_u16(26)? == DIA_STATUS)
        }),
    )?;
    registry.register(
        ScannerDef::new("StatusEffectList", "Please wait...", Origin::Server)
            .scan(|packet, _| Ok(packet.size() == 416 && packet.ipc_u16(20)? == DIA_STATUS)),
    )?;
    //=================
    registry.register(
        ScannerDef::new("ActorGauge", "Wait for gauge changes, then clear the lilies.", Origin::Server)
            .scan(|packet, _| {
                Ok(packet.size() == 48
                    && packet.ipc_u8(0)? == 24
                    && packet.ipc_u8(5)? == 0
                    && packet.ipc_u8(6)? > 0)
            }),
    )?;
    //=================
    // one variant per target-count bucket, each a fixed packet size
    for (name, tutorial, size) in [
        ("AoeEffect8", "Attack multiple enemies with Holy.", 668),
        ("AoeEffect16", "Attack multiple enemies (>8) with Holy.", 1244),
        ("AoeEffect24", "Attack multiple enemies (>16) with Holy.", 1820),
        ("AoeEffect32", "Attack multiple enemies (>24) with Holy.", 2396),
    ] {
        registry.register(
            ScannerDef::new(name, tutorial, Origin::Server)
                .scan(move |packet, _| Ok(packet.size() == size && packet.ipc_u16(8)? == HOLY_ACTION)),
        )?;
    }
    //=================
    registry.register(
        ScannerDef::new("MiniCactpotInit", "Start playing Mini Cactpot.", Origin::Server)
            .scan(|packet, _| {
                if packet.size() != IPC_DATA + 136 {
                    return Ok(false);
                }
                let index_end = packet.ipc_u8(7)?;
                let column = packet.ipc_u32(12)?;
                let row = packet.ipc_u32(16)?;
                let digit = packet.ipc_u32(20)?;
                Ok(index_end == 23 && column <= 2 && row <= 2 && digit <= 9)
            }),
    )?;

    Ok(())
}
